// src/consolidate/schema.rs
//! Typed analysis schema and structural validation of model output.
//!
//! Validation deserializes into strict types: a required field that is
//! missing or has the wrong JSON type rejects the whole object. Nothing is
//! coerced. Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assemble::Cluster;

/// Which per-story breakdown the model is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// `sentiments`: for / neutral / against.
    #[default]
    Stance,
    /// `narratives`: competing framings of the story.
    Narrative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Example {
    Quote(String),
    Attributed { source: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanceGroup {
    pub summary: String,
    #[serde(default)]
    pub examples: Vec<Example>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentiments {
    #[serde(rename = "for")]
    pub for_: StanceGroup,
    pub neutral: StanceGroup,
    pub against: StanceGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub label: String,
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Breakdown {
    Sentiments(Sentiments),
    Narratives(Vec<Narrative>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArticle {
    pub title: String,
    pub link: String,
    pub source: String,
}

/// One consolidated story. Built only through [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidatedAnalysis {
    pub story_id: String,
    pub factual_headline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub core_facts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji_thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(flatten)]
    pub breakdown: Breakdown,
    pub source_articles: Vec<SourceArticle>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema violation: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("schema violation: factual_headline is blank")]
    BlankHeadline,
}

#[derive(Deserialize)]
struct Common {
    factual_headline: String,
    #[serde(default)]
    summary: Option<String>,
    core_facts: Vec<String>,
    #[serde(default)]
    emoji_thumbnail: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Deserialize)]
struct StanceShape {
    #[serde(flatten)]
    common: Common,
    sentiments: Sentiments,
}

#[derive(Deserialize)]
struct NarrativeShape {
    #[serde(flatten)]
    common: Common,
    narratives: Vec<Narrative>,
}

/// Check `value` against the mode's schema and build the analysis. Whatever
/// the model put in `source_articles` is replaced by the cluster members.
pub fn validate(
    value: Value,
    mode: AnalysisMode,
    cluster: &Cluster,
) -> Result<ConsolidatedAnalysis, SchemaError> {
    let (common, breakdown) = match mode {
        AnalysisMode::Stance => {
            let s: StanceShape = serde_json::from_value(value)?;
            (s.common, Breakdown::Sentiments(s.sentiments))
        }
        AnalysisMode::Narrative => {
            let s: NarrativeShape = serde_json::from_value(value)?;
            (s.common, Breakdown::Narratives(s.narratives))
        }
    };
    if common.factual_headline.trim().is_empty() {
        return Err(SchemaError::BlankHeadline);
    }

    let source_articles = cluster
        .articles
        .iter()
        .map(|a| SourceArticle {
            title: a.title.clone(),
            link: a.link.clone(),
            source: a.source.clone(),
        })
        .collect();

    Ok(ConsolidatedAnalysis {
        story_id: cluster.story_id.clone(),
        factual_headline: common.factual_headline,
        summary: common.summary,
        core_facts: common.core_facts,
        emoji_thumbnail: common.emoji_thumbnail,
        category: common.category,
        region: common.region,
        breakdown,
        source_articles,
    })
}
