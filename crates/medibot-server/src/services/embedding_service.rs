use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::RetrievalConfig;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    content: &'a str,
    input: &'a str,
}

/// Client for the sentence-embedding server
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    url: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            url: config.embedding_url.clone(),
            dimension: config.embedding_dimension,
        }
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        // Send both field names for llama.cpp / OpenAI compatibility
        let request = EmbeddingRequest {
            content: text,
            input: text,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = parse_embedding(&json_value)?;

        if embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }
}

/// Accepts `{"embedding": [...]}`, `{"data": [{"embedding": [...]}]}`,
/// `[{"embedding": [...]}]` and bare `[...]`.
fn parse_embedding(json_value: &Value) -> Result<Vec<f32>> {
    let floats = |arr: &Vec<Value>| -> Vec<f32> {
        arr.iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    };

    let embedding = match json_value {
        Value::Array(arr) => match arr.first() {
            None => anyhow::bail!("Empty array returned from embedding server"),
            Some(first) => match first.get("embedding").and_then(Value::as_array) {
                Some(inner) => floats(inner),
                None => floats(arr),
            },
        },
        Value::Object(obj) => {
            if let Some(inner) = obj.get("embedding").and_then(Value::as_array) {
                floats(inner)
            } else if let Some(inner) = obj
                .get("data")
                .and_then(Value::as_array)
                .and_then(|data| data.first())
                .and_then(|d| d.get("embedding"))
                .and_then(Value::as_array)
            {
                floats(inner)
            } else {
                anyhow::bail!("Unrecognized embedding response format: {}", json_value);
            }
        }
        _ => anyhow::bail!("Unrecognized embedding response format: {}", json_value),
    };

    if embedding.is_empty() {
        anyhow::bail!("Generated embedding is empty");
    }

    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_embedding_shapes() {
        assert_eq!(parse_embedding(&json!({"embedding": [0.5, 1.0]})).unwrap(), vec![0.5, 1.0]);
        assert_eq!(
            parse_embedding(&json!({"data": [{"embedding": [0.25]}]})).unwrap(),
            vec![0.25]
        );
        assert_eq!(parse_embedding(&json!([{"embedding": [1.0]}])).unwrap(), vec![1.0]);
        assert_eq!(parse_embedding(&json!([1.0, 2.0])).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_parse_embedding_rejects_garbage() {
        assert!(parse_embedding(&json!([])).is_err());
        assert!(parse_embedding(&json!({"vector": [1.0]})).is_err());
        assert!(parse_embedding(&json!({"embedding": []})).is_err());
    }
}
