use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Form,
};
use quick_xml::escape::escape;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::services::whatsapp_jobs::{MediaItem, WhatsAppJob};
use crate::state::AppState;
use crate::utils::text::preview;

pub const WELCOME_MESSAGE: &str =
    "👋 Welcome to Medical Chatbot!\n\nAsk health questions or send medical images/PDFs.";
pub const BUSY_MESSAGE: &str = "⚠ Server is busy. Please try again in a moment.";

const WELCOME_GREETINGS: &[&str] = &["hi", "hello", "hey", "hii", "hiii", "hola"];

/// TwiML body; `None` is the empty acknowledgement.
pub fn twiml(message: Option<&str>) -> String {
    match message {
        Some(text) => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>{}</Message></Response>"#,
            escape(text)
        ),
        None => r#"<?xml version="1.0" encoding="UTF-8"?><Response/>"#.to_string(),
    }
}

fn xml_response(message: Option<&str>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        twiml(message),
    )
        .into_response()
}

/// Twilio `MediaUrl{i}` / `MediaContentType{i}` pairs
fn media_items(form: &HashMap<String, String>) -> Vec<MediaItem> {
    let count: usize = form
        .get("NumMedia")
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0);

    (0..count)
        .filter_map(|i| {
            let url = form.get(&format!("MediaUrl{}", i))?.trim();
            if url.is_empty() {
                return None;
            }
            Some(MediaItem {
                url: url.to_string(),
                content_type: form
                    .get(&format!("MediaContentType{}", i))
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
            })
        })
        .collect()
}

/// `POST /whatsapp`: acknowledge at once, answer in the background
pub async fn whatsapp_webhook(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let sender = form.get("From").cloned().unwrap_or_default();
    let body = form
        .get("Body")
        .map(|b| b.trim().to_string())
        .unwrap_or_default();
    let media = media_items(&form);

    info!(
        "WhatsApp from {}: '{}' media={}",
        sender,
        preview(&body),
        media.len()
    );

    let is_greeting = WELCOME_GREETINGS.contains(&body.to_lowercase().as_str());
    if is_greeting && state.connected_senders.connect(&sender) {
        return xml_response(Some(WELCOME_MESSAGE));
    }

    let job = WhatsAppJob {
        sender,
        body,
        media,
    };

    match state.whatsapp_pool.submit(job) {
        Ok(()) => xml_response(None),
        Err(job) => {
            warn!("Worker pool saturated; rejecting message from {}", job.sender);
            xml_response(Some(BUSY_MESSAGE))
        }
    }
}
