// src/config/completion.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

use anyhow::Context;

pub const DEFAULT_COMPLETION_CONFIG_PATH: &str = "config/completion.json";
pub const ENV_COMPLETION_CONFIG_PATH: &str = "COMPLETION_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub enabled: bool,
    /// "gemini" | "openai" | "mock" (case-insensitive)
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from GOOGLE_API_KEY / OPENAI_API_KEY (by provider)
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "gemini".to_string(),
            model: None,
            api_key: String::new(),
            base_url: None,
        }
    }
}

impl CompletionConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("read completion config {}", path.display()))?;
        let cfg: CompletionConfig = serde_json::from_str(&data)
            .with_context(|| format!("parse completion config {}", path.display()))?;
        cfg.resolved()
    }

    /// `COMPLETION_CONFIG_PATH` or the default path; a missing file means
    /// completions are disabled.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_COMPLETION_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_COMPLETION_CONFIG_PATH.to_string());
        if !Path::new(&path).exists() {
            tracing::warn!(path = %path, "completion config not found; completions disabled");
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    fn resolved(mut self) -> anyhow::Result<Self> {
        self.provider = self.provider.trim().to_lowercase();

        // Keys are only needed when something will actually be called.
        if self.enabled && self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "gemini" => env::var("GOOGLE_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing GOOGLE_API_KEY env var"))?,
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                "mock" => String::new(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if self.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            self.model = None;
        }
        Ok(self)
    }
}
