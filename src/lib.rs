// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod assemble;
pub mod cluster;
pub mod coherence;
pub mod completion;
pub mod config;
pub mod consolidate;
pub mod features;
pub mod ingest;
pub mod normalize;
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::assemble::Cluster;
pub use crate::completion::{Completion, CompletionClient, CompletionRequest};
pub use crate::consolidate::{ConsolidatedAnalysis, RunStats};
pub use crate::ingest::types::{Article, ArticleSource};
pub use crate::pipeline::Pipeline;
