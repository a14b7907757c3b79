// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::types::{Article, ArticleSource};
use crate::normalize::strip_markup;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    summary: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

/// One RSS 2.0 feed. A feed that cannot be fetched or parsed is logged and
/// yields no articles; the other feeds of the run are unaffected.
pub struct RssFeedSource {
    label: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedSource {
    pub fn from_fixture_str(label: &str, xml: &str) -> Self {
        Self {
            label: label.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(url: &str, client: reqwest::Client) -> Self {
        Self {
            label: url.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let source = rss
            .channel
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.label)
            .to_string();

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = strip_markup(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            // Feeds use either <description> or <summary> for the teaser.
            let body_raw = it.description.or(it.summary).unwrap_or_default();
            out.push(Article {
                title,
                body: strip_markup(&body_raw),
                link: it.link.map(|l| l.trim().to_string()).unwrap_or_default(),
                source: source.clone(),
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822_to_unix),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_articles_total").increment(out.len() as u64);
        Ok(out)
    }

    async fn fetch_body(url: &str, client: &reqwest::Client) -> Result<String> {
        let resp = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("rss http get {url}"))?
            .error_for_status()
            .with_context(|| format!("rss http status {url}"))?;
        resp.text().await.context("rss http .text()")
    }
}

#[async_trait]
impl ArticleSource for RssFeedSource {
    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        let parsed = match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => match Self::fetch_body(url, client).await {
                Ok(body) => self.parse_items_from_str(&body),
                Err(e) => Err(e),
            },
        };

        match parsed {
            Ok(articles) => Ok(articles),
            Err(e) => {
                tracing::warn!(error = ?e, feed = %self.label, "feed unavailable, skipping");
                counter!("source_errors_total").increment(1);
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Rewrite HTML named entities that XML does not know into their characters.
/// The five XML entities are left alone; unknown names are escaped so the
/// parser sees literal text instead of rejecting the whole feed.
fn scrub_html_entities_for_xml(s: &str) -> String {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").expect("entity regex"));
    re.replace_all(s, |caps: &regex::Captures| {
        let name = &caps[1];
        if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
            return caps[0].to_string();
        }
        let decoded = html_escape::decode_html_entities(&caps[0]);
        if decoded == caps[0] {
            format!("&amp;{name};")
        } else {
            decoded.into_owned()
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Wire</title>
    <link>https://wire.example</link>
    <item>
      <title>Storm hits &ldquo;coast&rdquo;</title>
      <link>https://wire.example/storm</link>
      <pubDate>Tue, 10 Jun 2025 12:00:00 +0000</pubDate>
      <description><![CDATA[<p>Heavy rain.</p><p>Roads closed.</p>]]></description>
    </item>
    <item>
      <title>   </title>
      <link>https://wire.example/empty</link>
    </item>
    <item>
      <title>No description</title>
      <link>https://wire.example/bare</link>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn parses_channel_title_and_items() {
        let src = RssFeedSource::from_fixture_str("fixture", XML);
        let items = src.fetch_articles().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source, "Example Wire");
        assert_eq!(items[0].title, "Storm hits \"coast\"");
        assert_eq!(items[0].body, "Heavy rain.\n\nRoads closed.");
        assert_eq!(items[0].published_at, Some(1_749_556_800));
        assert_eq!(items[1].body, "");
        assert_eq!(items[1].published_at, None);
    }

    #[tokio::test]
    async fn broken_feed_yields_nothing() {
        let src = RssFeedSource::from_fixture_str("broken", "<rss><channel>");
        let items = src.fetch_articles().await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn html_only_entities_do_not_drop_the_feed() {
        let xml = r#"<rss version="2.0"><channel><title>Caf&eacute; Wire</title>
<item><title>Sterling falls below &pound;1 &ndash; again &amp; again</title>
<link>https://wire.example/gbp</link></item>
<item><title>Odd &madeup; entity</title><link>https://wire.example/odd</link></item>
</channel></rss>"#;
        let items = RssFeedSource::from_fixture_str("entities", xml)
            .fetch_articles()
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source, "Café Wire");
        assert_eq!(items[0].title, "Sterling falls below £1 \u{2013} again & again");
        assert_eq!(items[1].title, "Odd &madeup; entity");
    }
}
