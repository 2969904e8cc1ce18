use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::services::EmbeddingService;

/// Passage returned by the vector index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedPassage {
    pub content: String,
}

impl RetrievedPassage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Similarity search over the medical corpus
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Up to `k` passages, most similar first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    #[serde(default)]
    metadata: Option<HashMap<String, Value>>,
}

/// Pinecone-backed retriever: embed the query, then nearest-neighbour search
pub struct PineconeRetriever {
    client: Client,
    embedding: EmbeddingService,
    index_host: String,
    api_key: String,
    namespace: Option<String>,
    text_field: String,
}

impl PineconeRetriever {
    /// Validate configuration and probe both backends once.
    pub async fn connect(config: &RetrievalConfig) -> Result<Arc<dyn RetrievalProvider>> {
        if config.pinecone_api_key.is_empty() {
            anyhow::bail!("PINECONE_API_KEY not set (retrieval.pinecone_api_key)");
        }
        if config.pinecone_index_host.is_empty() {
            anyhow::bail!("Pinecone index host not set (retrieval.pinecone_index_host)");
        }

        let retriever = Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .context("Failed to create HTTP client")?,
            embedding: EmbeddingService::new(config),
            index_host: normalize_host(&config.pinecone_index_host),
            api_key: config.pinecone_api_key.clone(),
            namespace: config.pinecone_namespace.clone().filter(|n| !n.is_empty()),
            text_field: config.text_field.clone(),
        };

        let probe = retriever
            .embedding
            .embed("test")
            .await
            .context("Embedding model probe failed")?;
        info!("Embedding dimension: {}", probe.len());

        retriever.describe_index().await?;

        Ok(Arc::new(retriever))
    }

    async fn describe_index(&self) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/describe_index_stats", self.index_host))
            .header("Api-Key", &self.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Failed to reach Pinecone index")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pinecone describe_index_stats failed ({}): {}", status, body);
        }

        let stats: Value = response.json().await.unwrap_or_default();
        info!(
            "Pinecone index reachable (vectors: {})",
            stats.get("totalVectorCount").cloned().unwrap_or(serde_json::Value::Null)
        );
        Ok(())
    }

    fn passage_text(&self, metadata: &HashMap<String, Value>) -> Option<String> {
        metadata
            .get(&self.text_field)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[async_trait::async_trait]
impl RetrievalProvider for PineconeRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        let vector = self.embedding.embed(query).await?;

        let request = QueryRequest {
            vector: &vector,
            top_k: k.max(1),
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/query", self.index_host))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to query Pinecone")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pinecone query failed ({}): {}", status, body);
        }

        let result: QueryResponse = response
            .json()
            .await
            .context("Failed to parse Pinecone query response")?;

        let passages: Vec<RetrievedPassage> = result
            .matches
            .iter()
            .filter_map(|m| m.metadata.as_ref())
            .filter_map(|meta| self.passage_text(meta))
            .map(RetrievedPassage::new)
            .collect();

        debug!("Retrieved {} passages", passages.len());
        Ok(passages)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}
