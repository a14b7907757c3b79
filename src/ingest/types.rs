// src/ingest/types.rs
use anyhow::Result;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub body: String,   // summary or full content, markup stripped
    pub link: String,
    pub source: String, // e.g. "BBC News - World"
    #[serde(default)]
    pub published_at: Option<u64>, // unix seconds, informational only
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        link: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            link: link.into(),
            source: source.into(),
            published_at: None,
        }
    }
}

#[async_trait::async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_articles(&self) -> Result<Vec<Article>>;
    fn name(&self) -> &str;
}
