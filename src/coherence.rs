// src/coherence.rs
use serde::{Deserialize, Serialize};

use crate::consolidate::ConsolidatedAnalysis;

pub const DEFAULT_EXCLUSION_PHRASES: &[&str] = &[
    "unrelated",
    "no core story",
    "no common story",
    "no single story",
    "disparate",
    "assorted",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceParams {
    pub exclusion_phrases: Vec<String>,
}

impl Default for CoherenceParams {
    fn default() -> Self {
        Self {
            exclusion_phrases: DEFAULT_EXCLUSION_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Keyword heuristic: an analysis whose serialized record mentions any
/// exclusion phrase is taken as the model admitting there is no shared story.
pub struct CoherenceFilter {
    phrases: Vec<String>,
}

impl CoherenceFilter {
    pub fn new(params: &CoherenceParams) -> Self {
        let phrases = params
            .exclusion_phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// First exclusion phrase found anywhere in the record, if any.
    pub fn offending_phrase(&self, analysis: &ConsolidatedAnalysis) -> Option<&str> {
        let text = serde_json::to_string(analysis)
            .unwrap_or_default()
            .to_lowercase();
        self.phrases
            .iter()
            .find(|p| text.contains(p.as_str()))
            .map(String::as_str)
    }

    /// Keep coherent analyses in order; returns (kept, dropped_count).
    pub fn apply(&self, analyses: Vec<ConsolidatedAnalysis>) -> (Vec<ConsolidatedAnalysis>, usize) {
        let mut kept = Vec::with_capacity(analyses.len());
        let mut dropped = 0usize;
        for a in analyses {
            match self.offending_phrase(&a) {
                Some(phrase) => {
                    tracing::info!(
                        story_id = %a.story_id,
                        headline = %a.factual_headline,
                        phrase,
                        "incoherent story dropped"
                    );
                    dropped += 1;
                }
                None => kept.push(a),
            }
        }
        (kept, dropped)
    }
}

impl Default for CoherenceFilter {
    fn default() -> Self {
        Self::new(&CoherenceParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Cluster;
    use crate::consolidate::{validate, AnalysisMode};
    use crate::ingest::types::Article;
    use serde_json::json;

    fn analysis(headline: &str) -> ConsolidatedAnalysis {
        let cluster = Cluster::new(vec![
            Article::new("a", "", "1", "S"),
            Article::new("b", "", "2", "S"),
        ]);
        let v = json!({
            "factual_headline": headline,
            "core_facts": [],
            "narratives": []
        });
        validate(v, AnalysisMode::Narrative, &cluster).unwrap()
    }

    #[test]
    fn drops_admitted_incoherence_case_insensitively() {
        let f = CoherenceFilter::default();
        let (kept, dropped) = f.apply(vec![
            analysis("Council approves budget"),
            analysis("NO COMMON STORY among these articles"),
            analysis("Ferry strike ends"),
        ]);
        assert_eq!(dropped, 1);
        let heads: Vec<_> = kept.iter().map(|a| a.factual_headline.as_str()).collect();
        assert_eq!(heads, vec!["Council approves budget", "Ferry strike ends"]);
    }

    #[test]
    fn custom_phrases_replace_defaults() {
        let f = CoherenceFilter::new(&CoherenceParams {
            exclusion_phrases: vec!["  Budget ".into(), "".into()],
        });
        assert_eq!(f.offending_phrase(&analysis("Council approves budget")), Some("budget"));
        assert!(f.offending_phrase(&analysis("Unrelated items")).is_none());
    }
}
