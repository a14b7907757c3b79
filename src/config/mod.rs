// src/config/mod.rs
pub mod completion;
pub mod engine;

pub use completion::CompletionConfig;
pub use engine::{EngineConfig, FeatureStrategy};
