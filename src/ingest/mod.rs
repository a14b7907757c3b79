// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{Article, ArticleSource};
use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// One-time metrics registration for the ingest series.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_articles_total",
            "Articles parsed from sources before filtering."
        );
        describe_counter!(
            "ingest_dropped_total",
            "Articles dropped as empty or duplicate links."
        );
        describe_counter!("source_errors_total", "Source fetch/parse errors.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Drop articles without a title and repeated links (first occurrence wins).
/// Returns (kept, dropped_count).
pub fn filter_dedup(raw: Vec<Article>) -> (Vec<Article>, usize) {
    let mut seen_links: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;

    for art in raw {
        if art.title.trim().is_empty() {
            dropped += 1;
            continue;
        }
        if !art.link.is_empty() && !seen_links.insert(art.link.clone()) {
            dropped += 1;
            continue;
        }
        keep.push(art);
    }
    (keep, dropped)
}

/// Fetch every source in order. A source returning `Err` fails the whole
/// collection; sources that merely have nothing contribute nothing.
pub async fn collect_articles(sources: &[Box<dyn ArticleSource>]) -> Result<Vec<Article>> {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for s in sources {
        let mut got = s
            .fetch_articles()
            .await
            .with_context(|| format!("article source {} failed", s.name()))?;
        tracing::debug!(source = s.name(), count = got.len(), "source fetched");
        raw.append(&mut got);
    }

    let (kept, dropped) = filter_dedup(raw);
    counter!("ingest_dropped_total").increment(dropped as u64);
    tracing::info!(kept = kept.len(), dropped, "articles collected");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(title: &str, link: &str) -> Article {
        Article::new(title, "", link, "Wire")
    }

    #[test]
    fn dedup_by_link_keeps_first() {
        let raw = vec![
            art("A", "https://x/1"),
            art("A again", "https://x/1"),
            art("B", ""),
            art("C", ""),
            art("  ", "https://x/2"),
        ];
        let (kept, dropped) = filter_dedup(raw);
        let titles: Vec<_> = kept.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(dropped, 2);
    }
}
