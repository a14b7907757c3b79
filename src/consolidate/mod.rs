// src/consolidate/mod.rs
//! Per-cluster consolidation: prompt, completion call, JSON extraction,
//! schema validation. Clusters are processed one after another; a failing
//! cluster is skipped and counted, never fatal to the batch.

pub mod extract;
pub mod prompt;
pub mod schema;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::assemble::{short_hash, Cluster};
use crate::completion::{Completion, CompletionClient};
use crate::normalize::truncate_chars;

pub use extract::{extract_json_object, ExtractError};
pub use schema::{validate, AnalysisMode, ConsolidatedAnalysis, SchemaError};

const LOGGED_RESPONSE_CHARS: usize = 400;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationParams {
    pub mode: AnalysisMode,
    /// Body characters per article in the prompt listing.
    pub excerpt_chars: usize,
    pub max_articles_per_cluster: usize,
}

impl Default for ConsolidationParams {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Stance,
            excerpt_chars: 600,
            max_articles_per_cluster: 20,
        }
    }
}

impl ConsolidationParams {
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        if self.excerpt_chars == 0 {
            self.excerpt_chars = d.excerpt_chars;
        }
        if self.max_articles_per_cluster < 2 {
            self.max_articles_per_cluster = d.max_articles_per_cluster;
        }
        self
    }
}

/// Why a cluster produced no analysis.
#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("completion blocked: {reason}")]
    Blocked { reason: String },
    #[error("completion collaborator failed: {0:#}")]
    Collaborator(anyhow::Error),
    #[error("malformed response: {0}")]
    Malformed(#[from] ExtractError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Blocked { .. } => "blocked",
            SkipReason::Collaborator(_) => "collaborator",
            SkipReason::Malformed(_) => "malformed",
            SkipReason::Schema(_) => "schema",
        }
    }
}

/// Per-run tallies of cluster outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub articles: usize,
    pub clusters: usize,
    pub analysed: usize,
    pub blocked: usize,
    pub collaborator_errors: usize,
    pub malformed: usize,
    pub schema_violations: usize,
    pub incoherent: usize,
}

impl RunStats {
    pub fn record_skip(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::Blocked { .. } => self.blocked += 1,
            SkipReason::Collaborator(_) => self.collaborator_errors += 1,
            SkipReason::Malformed(_) => self.malformed += 1,
            SkipReason::Schema(_) => self.schema_violations += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.blocked + self.collaborator_errors + self.malformed + self.schema_violations
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "consolidation_ok_total",
            "Clusters that produced a validated analysis."
        );
        describe_counter!(
            "consolidation_skipped_total",
            "Clusters skipped, labelled by reason."
        );
    });
}

fn log_response(story_id: &str, text: &str, err: &ExtractError) {
    tracing::warn!(
        story_id,
        response_id = %short_hash(text),
        response_chars = text.chars().count(),
        response = %truncate_chars(text, LOGGED_RESPONSE_CHARS),
        error = %err,
        "could not extract JSON object from completion"
    );
}

/// Analyse one cluster.
pub async fn consolidate_cluster(
    client: &dyn CompletionClient,
    cluster: &Cluster,
    params: &ConsolidationParams,
) -> Result<ConsolidatedAnalysis, SkipReason> {
    let req = prompt::build_request(cluster, params);
    tracing::debug!(
        story_id = %cluster.story_id,
        members = cluster.len(),
        provider = client.provider_name(),
        prompt_chars = req.instruction.len() + req.listing.len(),
        "requesting consolidation"
    );

    let text = match client.complete(&req).await {
        Ok(Completion::Text(t)) => t,
        Ok(Completion::Blocked { reason }) => return Err(SkipReason::Blocked { reason }),
        Err(e) => return Err(SkipReason::Collaborator(e)),
    };

    let value =
        extract_json_object(&text).inspect_err(|e| log_response(&cluster.story_id, &text, e))?;
    validate(value, params.mode, cluster).map_err(SkipReason::from)
}

/// Analyse every cluster in order, returning the analyses that validated.
pub async fn consolidate_all(
    client: &dyn CompletionClient,
    clusters: &[Cluster],
    params: &ConsolidationParams,
    stats: &mut RunStats,
) -> Vec<ConsolidatedAnalysis> {
    ensure_metrics_described();

    let mut out = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        match consolidate_cluster(client, cluster, params).await {
            Ok(analysis) => {
                counter!("consolidation_ok_total").increment(1);
                stats.analysed += 1;
                out.push(analysis);
            }
            Err(reason) => {
                counter!("consolidation_skipped_total", "reason" => reason.label()).increment(1);
                tracing::warn!(
                    story_id = %cluster.story_id,
                    members = cluster.len(),
                    reason = reason.label(),
                    error = %reason,
                    "cluster skipped"
                );
                stats.record_skip(&reason);
            }
        }
    }
    out
}
