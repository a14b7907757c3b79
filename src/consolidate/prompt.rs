// src/consolidate/prompt.rs
use serde::Serialize;

use super::schema::AnalysisMode;
use super::ConsolidationParams;
use crate::assemble::Cluster;
use crate::completion::CompletionRequest;
use crate::normalize::truncate_chars;

const PREAMBLE: &str = "You are a news analyst. The articles below were grouped \
because they appear to report the same story. Consolidate them into ONE analysis. \
Respond with exactly one JSON object and nothing else: no markdown, no commentary.";

const COMMON_FIELDS: &str = r#"Required fields:
- "factual_headline": string, a neutral headline stating the core event.
- "core_facts": array of strings, facts all or most articles agree on.
Optional fields:
- "summary": string, two or three neutral sentences.
- "emoji_thumbnail": string, a single emoji for the story.
- "category": string, e.g. "politics", "business", "science".
- "region": string, the main country or region concerned.
- "source_articles": array of {"title", "link", "source"}."#;

const STANCE_FIELDS: &str = r#"- "sentiments": object with keys "for", "neutral" and "against"; each is
  {"summary": string, "examples": array of quotes, each a string or {"source": string, "text": string}}."#;

const NARRATIVE_FIELDS: &str = r#"- "narratives": array of {"label": string, "summary": string, "sources": array of source names},
  one entry per distinct framing of the story across outlets."#;

const COHERENCE_NOTE: &str = "If the articles do not describe one shared story, \
say so plainly in \"factual_headline\" (for example \"No common story\").";

/// The fixed instruction for a mode; the listing is appended by the caller.
pub fn instruction(mode: AnalysisMode) -> String {
    let breakdown = match mode {
        AnalysisMode::Stance => STANCE_FIELDS,
        AnalysisMode::Narrative => NARRATIVE_FIELDS,
    };
    format!("{PREAMBLE}\n\n{COMMON_FIELDS}\nRequired breakdown:\n{breakdown}\n\n{COHERENCE_NOTE}")
}

#[derive(Serialize)]
struct ListingEntry<'a> {
    title: &'a str,
    excerpt: &'a str,
    source: &'a str,
}

/// Compact JSON array of `{title, excerpt, source}` for the first
/// `max_articles_per_cluster` members.
pub fn listing(cluster: &Cluster, params: &ConsolidationParams) -> String {
    let entries: Vec<ListingEntry<'_>> = cluster
        .articles
        .iter()
        .take(params.max_articles_per_cluster)
        .map(|a| ListingEntry {
            title: a.title.trim(),
            excerpt: truncate_chars(a.body.trim(), params.excerpt_chars),
            source: a.source.trim(),
        })
        .collect();
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}

pub fn build_request(cluster: &Cluster, params: &ConsolidationParams) -> CompletionRequest {
    CompletionRequest {
        instruction: instruction(params.mode),
        listing: listing(cluster, params),
    }
}
