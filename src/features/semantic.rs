// src/features/semantic.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::umap::{reduce, UmapParams};
use super::{FeatureExtractor, FeatureVector};
use crate::ingest::types::Article;
use crate::normalize::paragraphs;

/// Title plus the first two non-empty body paragraphs, blank-line separated.
pub fn excerpt(article: &Article) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    let title = article.title.trim();
    if !title.is_empty() {
        parts.push(title);
    }
    parts.extend(paragraphs(&article.body).into_iter().take(2));
    parts.join("\n\n")
}

/// Sentence-embedding collaborator: one vector per input text.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticParams {
    /// Embedding model name sent to the embeddings endpoint.
    pub model: String,
    /// OpenAI-compatible base URL, e.g. a local inference server.
    pub base_url: String,
    /// Bearer key, or `"ENV"` to read `OPENAI_API_KEY`.
    pub api_key: String,
    pub reduction: UmapParams,
}

impl Default for SemanticParams {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: "ENV".to_string(),
            reduction: UmapParams::default(),
        }
    }
}

/// `POST {base_url}/embeddings` with a batch of inputs.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(http: reqwest::Client, api_key: String, model: &str, base_url: &str) -> Self {
        Self {
            http,
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let req = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let resp = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("embeddings http post")?
            .error_for_status()
            .context("embeddings http status")?;
        let mut body: EmbeddingResponse = resp.json().await.context("embeddings json body")?;
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &str {
        "openai-embeddings"
    }
}

pub struct SemanticExtractor {
    embedder: Arc<dyn Embedder>,
    reduction: UmapParams,
}

impl SemanticExtractor {
    pub fn new(embedder: Arc<dyn Embedder>, reduction: UmapParams) -> Self {
        Self {
            embedder,
            reduction,
        }
    }
}

#[async_trait::async_trait]
impl FeatureExtractor for SemanticExtractor {
    async fn extract(&self, articles: &[Article]) -> Result<Vec<FeatureVector>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }
        let excerpts: Vec<String> = articles.iter().map(excerpt).collect();
        let raw = self
            .embedder
            .embed(&excerpts)
            .await
            .with_context(|| format!("embedder {} failed", self.embedder.name()))?;

        if raw.len() != articles.len() {
            return Err(anyhow!(
                "embedder returned {} vectors for {} texts",
                raw.len(),
                articles.len()
            ));
        }
        let dim = raw[0].len();
        if dim == 0 || raw.iter().any(|v| v.len() != dim) {
            return Err(anyhow!("embedder returned vectors of unequal or zero dimension"));
        }

        let reduced = reduce(&raw, &self.reduction);
        tracing::debug!(
            docs = reduced.len(),
            from_dim = dim,
            to_dim = reduced.first().map(Vec::len).unwrap_or(0),
            "embeddings reduced"
        );
        Ok(reduced.into_iter().map(FeatureVector::Dense).collect())
    }

    fn name(&self) -> &'static str {
        "semantic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder(usize);

    #[async_trait::async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().take(self.0).map(|t| vec![t.len() as f32, 1.0]).collect())
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn excerpt_takes_title_and_two_paragraphs() {
        let a = Article::new("Title", "\n\nOne\n\n\n\nTwo\n\nThree", "l", "s");
        assert_eq!(excerpt(&a), "Title\n\nOne\n\nTwo");
        let b = Article::new("Only title", "", "l", "s");
        assert_eq!(excerpt(&b), "Only title");
    }

    #[tokio::test]
    async fn empty_input_skips_embedder() {
        let ex = SemanticExtractor::new(Arc::new(FixedEmbedder(0)), UmapParams::default());
        assert!(ex.extract(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_embedder_output_is_an_error() {
        let ex = SemanticExtractor::new(Arc::new(FixedEmbedder(1)), UmapParams::default());
        let arts = vec![Article::new("a", "", "1", "s"), Article::new("b", "", "2", "s")];
        assert!(ex.extract(&arts).await.is_err());
    }

    #[tokio::test]
    async fn small_corpus_keeps_embedding_dimension() {
        let ex = SemanticExtractor::new(Arc::new(FixedEmbedder(usize::MAX)), UmapParams::default());
        let arts = vec![Article::new("a", "", "1", "s"), Article::new("bb", "", "2", "s")];
        let v = ex.extract(&arts).await.unwrap();
        assert_eq!(v.len(), 2);
        assert!(v.iter().all(|x| x.dim() == 2));
    }
}
