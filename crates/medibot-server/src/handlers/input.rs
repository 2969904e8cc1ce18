//! Chat input shared by the web and chat-history routes
//!
//! Accepts JSON, multipart or urlencoded bodies; an image may arrive as a
//! multipart file or as base64 (bare or a `data:image/<ext>;base64,` URL).

use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::models::chat::StreamChatRequest;
use crate::state::AppState;
use crate::utils::error::ApiError;
use crate::utils::sanitize_filename;
use crate::utils::text::preview;

const OCR_SEPARATOR: &str = "\n\nExtracted from image:\n";

#[derive(Debug, Clone)]
pub enum ImageUpload {
    /// Multipart file with the client's filename
    File { file_name: String, data: Bytes },
    /// Decoded base64 payload
    Inline { extension: String, data: Vec<u8> },
}

#[derive(Debug, Default)]
pub struct ChatInput {
    pub text: String,
    pub image: Option<ImageUpload>,
}

/// Input after the image (if any) has been saved and read
#[derive(Debug, Default, PartialEq)]
pub struct PreparedInput {
    /// What the orchestrator answers
    pub query: String,
    /// What is stored as the user's message
    pub display_text: String,
    pub image_url: Option<String>,
}

impl<S: Send + Sync> FromRequest<S> for ChatInput {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        // no declared body type reads as an empty form
        if content_type.is_empty() {
            return Ok(ChatInput::default());
        }

        if content_type.starts_with("application/json") {
            let Json(body) = Json::<StreamChatRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;

            let image = body
                .image_base64
                .as_deref()
                .filter(|s| !s.is_empty())
                .and_then(decode_base64_image);

            return Ok(ChatInput {
                text: body.text(),
                image,
            });
        }

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            return read_multipart(multipart).await;
        }

        let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let text = ["msg", "message", "text"]
            .iter()
            .filter_map(|k| fields.get(*k))
            .find(|v| !v.trim().is_empty())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        Ok(ChatInput { text, image: None })
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<ChatInput, ApiError> {
    let mut input = ChatInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
            // "image" wins over any other file field
            if !data.is_empty() && (input.image.is_none() || name == "image") {
                input.image = Some(ImageUpload::File { file_name, data });
            }
            continue;
        }

        match name.as_str() {
            "msg" | "message" | "text" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid {}: {}", name, e)))?;
                if input.text.is_empty() {
                    input.text = value.trim().to_string();
                }
            }
            _ => {}
        }
    }

    Ok(input)
}

/// `data:image/<ext>;base64,<payload>` or a bare payload (assumed PNG).
fn decode_base64_image(value: &str) -> Option<ImageUpload> {
    let (extension, payload) = match value
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
    {
        Some((ext, payload)) => (ext.to_string(), payload),
        None => ("png".to_string(), value),
    };

    match STANDARD.decode(payload.trim()) {
        Ok(data) => Some(ImageUpload::Inline { extension, data }),
        Err(e) => {
            warn!("Ignoring undecodable base64 image: {}", e);
            None
        }
    }
}

/// Message text followed by the OCR text, or the OCR text alone.
pub fn compose_input(text: &str, extracted: &str) -> String {
    match (text.is_empty(), extracted.is_empty()) {
        (_, true) => text.to_string(),
        (true, false) => extracted.to_string(),
        (false, false) => format!("{}{}{}", text, OCR_SEPARATOR, extracted),
    }
}

async fn save_upload(dir: &Path, file_name: &str, data: &[u8]) -> Result<String, ApiError> {
    let file_name = sanitize_filename(file_name);
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(&file_name), data).await?;
    debug!("Saved upload {} ({} bytes)", file_name, data.len());
    Ok(file_name)
}

impl ChatInput {
    /// Save the image under the upload directory, read its text and build
    /// the final query. `prefix` namespaces the stored filename.
    pub async fn prepare(self, state: &AppState, prefix: &str) -> Result<PreparedInput, ApiError> {
        let Some(image) = self.image else {
            return Ok(PreparedInput {
                query: self.text.clone(),
                display_text: self.text,
                image_url: None,
            });
        };

        let upload_dir = &state.settings.storage.upload_dir;
        let stored_name = match &image {
            ImageUpload::File { file_name, data } => {
                let name = format!("{}_{}_{}", prefix, chrono::Utc::now().timestamp(), file_name);
                save_upload(upload_dir, &name, data).await?
            }
            ImageUpload::Inline { extension, data } => {
                let name = format!("{}_{}.{}", prefix, uuid::Uuid::new_v4().simple(), extension);
                save_upload(upload_dir, &name, data).await?
            }
        };

        let extracted = state
            .extractor
            .extract_text(&upload_dir.join(&stored_name))
            .await;
        info!("OCR preview: {}", preview(&extracted));

        let display_text = if self.text.is_empty() {
            extracted.clone()
        } else {
            self.text.clone()
        };

        Ok(PreparedInput {
            query: compose_input(&self.text, &extracted),
            display_text,
            image_url: Some(format!("/uploads/{}", stored_name)),
        })
    }
}
