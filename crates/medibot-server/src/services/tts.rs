use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::TtsConfig;

/// Longest text the speech endpoint accepts per request
const MAX_CHUNK_CHARS: usize = 100;

/// Speech language from the script of the text.
pub fn detect_tts_lang(text: &str) -> &'static str {
    let in_range = |lo: u32, hi: u32| text.chars().any(|c| (lo..=hi).contains(&(c as u32)));

    if in_range(0x0C80, 0x0CFF) {
        "kn"
    } else if in_range(0x0900, 0x097F) {
        "hi"
    } else if in_range(0x0B80, 0x0BFF) {
        "ta"
    } else if in_range(0x0C00, 0x0C7F) {
        "te"
    } else {
        "en"
    }
}

/// Split on whitespace into chunks of at most `max_chars` characters.
/// Words longer than a chunk are cut.
fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current.is_empty() { word.len() } else { current_len + 1 + word.len() };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Google Translate speech endpoint client
#[derive(Clone)]
pub struct TtsService {
    client: Client,
    endpoint: String,
}

impl TtsService {
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(20))
                .user_agent("Mozilla/5.0")
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint: config.endpoint.clone(),
        }
    }

    /// MP3 audio for `text`, in the language its script suggests.
    pub async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let lang = detect_tts_lang(text);
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            anyhow::bail!("Nothing to synthesize");
        }

        debug!("Synthesizing {} chunks (lang={})", chunks.len(), lang);

        let total = chunks.len().to_string();
        let mut audio = BytesMut::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", lang),
                    ("q", chunk.as_str()),
                    ("idx", idx.as_str()),
                    ("total", total.as_str()),
                ])
                .send()
                .await
                .context("Failed to reach TTS endpoint")?;

            if !response.status().is_success() {
                anyhow::bail!("TTS endpoint returned {}", response.status());
            }

            audio.extend_from_slice(&response.bytes().await.context("Failed to read TTS audio")?);
        }

        Ok(audio.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_detect_tts_lang() {
        assert_eq!(detect_tts_lang("ನಮಸ್ಕಾರ"), "kn");
        assert_eq!(detect_tts_lang("नमस्ते"), "hi");
        assert_eq!(detect_tts_lang("வணக்கம்"), "ta");
        assert_eq!(detect_tts_lang("నమస్కారం"), "te");
        assert_eq!(detect_tts_lang("hello"), "en");
    }

    #[test]
    fn test_chunks_respect_limit() {
        let text = "word ".repeat(60);
        let chunks = chunk_text(&text, 100);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn test_long_word_is_cut() {
        let chunks = chunk_text(&format!("ab {}", "x".repeat(250)), 100);
        assert_eq!(chunks[0], "ab");
        assert_eq!(chunks[1].len(), 100);
        assert_eq!(chunks[2].len(), 100);
        assert_eq!(chunks[3].len(), 50);
    }

    #[tokio::test]
    async fn test_synthesize_concatenates_segments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("tl", "en"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
            .expect(2)
            .mount(&server)
            .await;

        let tts = TtsService::new(&TtsConfig {
            endpoint: format!("{}/translate_tts", server.uri()),
        });
        let text = "fever ".repeat(30);
        let audio = tts.synthesize(&text).await.unwrap();

        assert_eq!(&audio[..], b"ID3ID3");
    }

    #[tokio::test]
    async fn test_synthesize_rejects_empty_and_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tts = TtsService::new(&TtsConfig {
            endpoint: format!("{}/translate_tts", server.uri()),
        });
        assert!(tts.synthesize("   ").await.is_err());
        assert!(tts.synthesize("hello").await.is_err());
    }
}
