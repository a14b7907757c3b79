// src/ingest/providers/newsapi.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::ingest::types::{Article, ArticleSource};
use crate::normalize::strip_markup;

const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";

#[derive(Debug, Deserialize)]
struct Resp {
    status: String,
    #[serde(default)]
    articles: Vec<ApiArticle>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiArticle {
    source: ApiSource,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSource {
    name: Option<String>,
}

/// NewsAPI `top-headlines` (country) or `everything` (query) search.
/// Unlike feeds, authentication and HTTP failures are returned as errors:
/// a misconfigured key should fail the run, not silently yield nothing.
pub struct NewsApiSource {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    query: Option<String>,
    country: String,
    page_size: u32,
}

impl NewsApiSource {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            query: None,
            country: "us".to_string(),
            page_size: 50,
        }
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.trim().is_empty());
        self
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 100);
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let page_size = self.page_size.to_string();
        let req = match &self.query {
            Some(q) => self
                .http
                .get(format!("{}/everything", self.base_url))
                .query(&[("q", q.as_str()), ("pageSize", page_size.as_str())]),
            None => self
                .http
                .get(format!("{}/top-headlines", self.base_url))
                .query(&[
                    ("country", self.country.as_str()),
                    ("pageSize", page_size.as_str()),
                ]),
        };
        req.header("X-Api-Key", &self.api_key)
    }
}

fn into_articles(resp: Resp) -> Vec<Article> {
    resp.articles
        .into_iter()
        .filter_map(|a| {
            let title = strip_markup(a.title.as_deref().unwrap_or_default());
            // NewsAPI marks deleted items with a literal "[Removed]" title.
            if title.is_empty() || title == "[Removed]" {
                return None;
            }
            let body_raw = a.content.or(a.description).unwrap_or_default();
            Some(Article {
                title,
                body: strip_markup(&body_raw),
                link: a.url.unwrap_or_default(),
                source: a.source.name.unwrap_or_else(|| "NewsAPI".to_string()),
                published_at: a
                    .published_at
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .and_then(|dt| u64::try_from(dt.timestamp()).ok()),
            })
        })
        .collect()
}

#[async_trait]
impl ArticleSource for NewsApiSource {
    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        if self.api_key.is_empty() {
            return Err(anyhow!("NewsAPI key is empty"));
        }
        let resp = self.request().send().await.context("newsapi http get")?;
        let status = resp.status();
        let body: Resp = resp.json().await.context("newsapi json body")?;
        if !status.is_success() || body.status != "ok" {
            counter!("source_errors_total").increment(1);
            return Err(anyhow!(
                "newsapi returned {status}: {}",
                body.message.as_deref().unwrap_or("no message")
            ));
        }
        let articles = into_articles(body);
        counter!("ingest_articles_total").increment(articles.len() as u64);
        Ok(articles)
    }

    fn name(&self) -> &str {
        "NewsAPI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_api_articles_and_drops_removed() {
        let raw = r#"{
            "status": "ok",
            "totalResults": 3,
            "articles": [
                {"source": {"id": null, "name": "Wire"}, "title": "Bridge reopens",
                 "description": "<b>Traffic</b> resumes", "content": null,
                 "url": "https://wire.example/bridge", "publishedAt": "2025-06-10T12:00:00Z"},
                {"source": {"id": null, "name": null}, "title": "[Removed]",
                 "description": null, "content": null, "url": "https://removed.example",
                 "publishedAt": null},
                {"source": {"id": "x", "name": null}, "title": "Untitled source",
                 "description": "d", "content": "full text", "url": null, "publishedAt": "bogus"}
            ]
        }"#;
        let resp: Resp = serde_json::from_str(raw).unwrap();
        let out = into_articles(resp);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].body, "Traffic resumes");
        assert_eq!(out[0].published_at, Some(1_749_556_800));
        assert_eq!(out[1].source, "NewsAPI");
        assert_eq!(out[1].body, "full text");
        assert_eq!(out[1].link, "");
        assert_eq!(out[1].published_at, None);
    }

    #[tokio::test]
    async fn empty_key_is_an_error() {
        let src = NewsApiSource::new(reqwest::Client::new(), String::new());
        assert!(src.fetch_articles().await.is_err());
    }
}
