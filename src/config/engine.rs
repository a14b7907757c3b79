// src/config/engine.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};

use crate::cluster::{dbscan::DbscanParams, hdbscan::HdbscanParams, ClusteringParams};
use crate::coherence::CoherenceParams;
use crate::consolidate::ConsolidationParams;
use crate::features::semantic::SemanticParams;
use crate::features::tfidf::LexicalParams;

pub const DEFAULT_ENGINE_CONFIG_PATH: &str = "config/engine.toml";
pub const ENV_ENGINE_CONFIG_PATH: &str = "ENGINE_CONFIG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStrategy {
    #[default]
    Lexical,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeaturesConfig {
    pub strategy: FeatureStrategy,
    pub lexical: LexicalParams,
    pub semantic: SemanticParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsApiConfig {
    /// Free-text query for `/everything`; absent means top headlines.
    pub query: Option<String>,
    pub country: String,
    pub page_size: u32,
    /// "ENV" means: read from NEWSAPI_KEY
    pub api_key: String,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            query: None,
            country: "us".to_string(),
            page_size: 50,
            api_key: "ENV".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub rss_feeds: Vec<String>,
    pub newsapi: Option<NewsApiConfig>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            rss_feeds: [
                "http://rss.cnn.com/rss/cnn_topstories.rss",
                "https://moxie.foxnews.com/google-publisher/latest.xml",
                "https://feeds.npr.org/1014/rss.xml",
                "https://www.aljazeera.com/xml/rss/all.xml",
                "http://feeds.bbci.co.uk/news/world/rss.xml",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            newsapi: None,
        }
    }
}

/// Engine configuration. Every section is optional in the TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub features: FeaturesConfig,
    /// Absent means the algorithm paired with the feature strategy.
    pub clustering: Option<ClusteringParams>,
    pub consolidation: ConsolidationParams,
    pub coherence: CoherenceParams,
    pub sources: SourcesConfig,
}

impl EngineConfig {
    /// Load from `ENGINE_CONFIG_PATH` or the default path. A missing file
    /// means defaults; an unreadable or invalid one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_ENGINE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENGINE_CONFIG_PATH));

        if !path.exists() {
            tracing::info!(path = %path.display(), "engine config not found; using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read engine config at {}: {}", path.display(), e)
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: EngineConfig = toml::from_str(toml_str)?;
        Ok(cfg.sanitized())
    }

    /// Clamp values that would make the run meaningless back to defaults.
    pub fn sanitized(mut self) -> Self {
        self.features.semantic.reduction = self.features.semantic.reduction.sanitized();
        self.consolidation = self.consolidation.sanitized();

        if let Some(ClusteringParams::Dbscan(p)) = &mut self.clustering {
            if !(p.eps.is_finite() && p.eps > 0.0 && p.eps <= 2.0) {
                p.eps = DbscanParams::default().eps;
            }
            p.min_samples = p.min_samples.max(1);
        }
        if let Some(ClusteringParams::Hdbscan(p)) = &mut self.clustering {
            p.min_cluster_size = p.min_cluster_size.max(2);
            if p.min_samples == Some(0) {
                p.min_samples = None;
            }
            if !(p.max_merge_distance.is_finite() && p.max_merge_distance > 0.0) {
                p.max_merge_distance = HdbscanParams::default().max_merge_distance;
            }
        }
        if let Some(n) = &mut self.sources.newsapi {
            n.page_size = n.page_size.clamp(1, 100);
        }
        self
    }

    /// Configured clustering, or DBSCAN for lexical and HDBSCAN for semantic.
    pub fn clustering(&self) -> ClusteringParams {
        match (&self.clustering, self.features.strategy) {
            (Some(c), _) => c.clone(),
            (None, FeatureStrategy::Lexical) => ClusteringParams::Dbscan(DbscanParams::default()),
            (None, FeatureStrategy::Semantic) => {
                ClusteringParams::Hdbscan(HdbscanParams::default())
            }
        }
    }
}

/// Resolve an `"ENV"` marker against the named variable.
pub fn resolve_key(raw: &str, var: &str) -> anyhow::Result<String> {
    if raw.trim().eq_ignore_ascii_case("env") {
        env::var(var).map_err(|_| anyhow::anyhow!("Missing {var} env var"))
    } else {
        Ok(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::AnalysisMode;

    #[test]
    fn empty_toml_is_all_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.features.strategy, FeatureStrategy::Lexical);
        assert_eq!(cfg.clustering().name(), "dbscan");
        assert_eq!(cfg.consolidation.excerpt_chars, 600);
        assert_eq!(cfg.sources.rss_feeds.len(), 5);
        assert!(cfg.sources.newsapi.is_none());
    }

    #[test]
    fn semantic_pairs_with_hdbscan_unless_overridden() {
        let cfg = EngineConfig::from_toml_str("[features]\nstrategy = \"semantic\"\n").unwrap();
        assert_eq!(cfg.clustering().name(), "hdbscan");

        let cfg = EngineConfig::from_toml_str(
            "[features]\nstrategy = \"semantic\"\n[clustering]\nalgorithm = \"dbscan\"\neps = 0.5\n",
        )
        .unwrap();
        let ClusteringParams::Dbscan(p) = cfg.clustering() else {
            panic!("expected dbscan");
        };
        assert_eq!(p.eps, 0.5);
        assert_eq!(p.min_samples, 2);
    }

    #[test]
    fn bad_values_are_sanitized() {
        let cfg = EngineConfig::from_toml_str(
            "[clustering]\nalgorithm = \"dbscan\"\neps = -3.0\nmin_samples = 0\n\
             [consolidation]\nmode = \"narrative\"\nexcerpt_chars = 0\n",
        )
        .unwrap();
        let ClusteringParams::Dbscan(p) = cfg.clustering() else {
            panic!("expected dbscan");
        };
        assert_eq!(p.eps, 0.8);
        assert_eq!(p.min_samples, 1);
        assert_eq!(cfg.consolidation.mode, AnalysisMode::Narrative);
        assert_eq!(cfg.consolidation.excerpt_chars, 600);
    }

    #[test]
    fn hdbscan_merge_ceiling_defaults_and_is_sanitized() {
        let cfg = EngineConfig::from_toml_str("[features]\nstrategy = \"semantic\"\n").unwrap();
        let ClusteringParams::Hdbscan(p) = cfg.clustering() else {
            panic!("expected hdbscan");
        };
        assert_eq!(p.max_merge_distance, 0.8);

        let cfg = EngineConfig::from_toml_str(
            "[clustering]\nalgorithm = \"hdbscan\"\nmax_merge_distance = -1.0\n",
        )
        .unwrap();
        let ClusteringParams::Hdbscan(p) = cfg.clustering() else {
            panic!("expected hdbscan");
        };
        assert_eq!(p.max_merge_distance, 0.8);
        assert_eq!(p.min_cluster_size, 2);
    }

    #[test]
    fn unknown_algorithm_is_an_error() {
        assert!(EngineConfig::from_toml_str("[clustering]\nalgorithm = \"kmeans\"\n").is_err());
    }

    #[test]
    fn plain_keys_pass_through() {
        assert_eq!(resolve_key("abc", "SOME_UNSET_VAR_FOR_TEST").unwrap(), "abc");
    }
}
