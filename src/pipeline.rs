// src/pipeline.rs
//! One invocation: fetch → vectorize → cluster → assemble → consolidate →
//! coherence filter. Nothing survives the call.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::assemble::assemble;
use crate::cluster::{cluster, ClusteringParams};
use crate::coherence::CoherenceFilter;
use crate::completion::{build_client_from_config, http_client, DynCompletionClient};
use crate::config::engine::resolve_key;
use crate::config::{CompletionConfig, EngineConfig, FeatureStrategy};
use crate::consolidate::{consolidate_all, ConsolidatedAnalysis, ConsolidationParams, RunStats};
use crate::features::semantic::{OpenAiEmbedder, SemanticExtractor};
use crate::features::tfidf::LexicalExtractor;
use crate::features::FeatureExtractor;
use crate::ingest::collect_articles;
use crate::ingest::providers::{NewsApiSource, RssFeedSource};
use crate::ingest::types::{Article, ArticleSource};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_articles_total", "Articles entering clustering.");
        describe_counter!(
            "pipeline_clusters_total",
            "Clusters of two or more articles sent to consolidation."
        );
        describe_counter!(
            "coherence_dropped_total",
            "Analyses dropped by the coherence filter."
        );
        describe_histogram!("pipeline_run_ms", "Full pipeline run time in milliseconds.");
    });
}

pub struct Pipeline {
    sources: Vec<Box<dyn ArticleSource>>,
    extractor: Box<dyn FeatureExtractor>,
    clustering: ClusteringParams,
    client: DynCompletionClient,
    consolidation: ConsolidationParams,
    coherence: CoherenceFilter,
}

impl Pipeline {
    pub fn new(
        sources: Vec<Box<dyn ArticleSource>>,
        extractor: Box<dyn FeatureExtractor>,
        client: DynCompletionClient,
        cfg: &EngineConfig,
    ) -> Self {
        Self {
            sources,
            extractor,
            clustering: cfg.clustering(),
            client,
            consolidation: cfg.consolidation.clone(),
            coherence: CoherenceFilter::new(&cfg.coherence),
        }
    }

    /// Wire the default HTTP collaborators from configuration.
    pub fn from_config(cfg: &EngineConfig, completion: &CompletionConfig) -> Result<Self> {
        let http = http_client()?;

        let mut sources: Vec<Box<dyn ArticleSource>> = cfg
            .sources
            .rss_feeds
            .iter()
            .map(|url| Box::new(RssFeedSource::from_url(url, http.clone())) as Box<dyn ArticleSource>)
            .collect();
        if let Some(n) = &cfg.sources.newsapi {
            let key = resolve_key(&n.api_key, "NEWSAPI_KEY").context("newsapi key")?;
            sources.push(Box::new(
                NewsApiSource::new(http.clone(), key)
                    .with_query(n.query.clone())
                    .with_country(&n.country)
                    .with_page_size(n.page_size),
            ));
        }

        let extractor: Box<dyn FeatureExtractor> = match cfg.features.strategy {
            FeatureStrategy::Lexical => {
                Box::new(LexicalExtractor::new(cfg.features.lexical.clone()))
            }
            FeatureStrategy::Semantic => {
                let p = &cfg.features.semantic;
                let key = resolve_key(&p.api_key, "OPENAI_API_KEY").context("embeddings key")?;
                let embedder = OpenAiEmbedder::new(http.clone(), key, &p.model, &p.base_url);
                Box::new(SemanticExtractor::new(Arc::new(embedder), p.reduction.clone()))
            }
        };

        let client = build_client_from_config(completion)?;
        tracing::info!(
            feeds = cfg.sources.rss_feeds.len(),
            newsapi = cfg.sources.newsapi.is_some(),
            features = extractor.name(),
            clustering = cfg.clustering().name(),
            provider = client.provider_name(),
            mode = ?cfg.consolidation.mode,
            "pipeline configured"
        );
        Ok(Self::new(sources, extractor, client, cfg))
    }

    pub async fn run(&self) -> Result<Vec<ConsolidatedAnalysis>> {
        Ok(self.run_detailed().await?.0)
    }

    pub async fn run_detailed(&self) -> Result<(Vec<ConsolidatedAnalysis>, RunStats)> {
        let t0 = Instant::now();
        let articles = collect_articles(&self.sources).await?;
        let out = self.analyse(articles).await;
        histogram!("pipeline_run_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        out
    }

    /// Everything after ingestion, over an already collected corpus.
    pub async fn analyse(
        &self,
        articles: Vec<Article>,
    ) -> Result<(Vec<ConsolidatedAnalysis>, RunStats)> {
        ensure_metrics_described();
        let mut stats = RunStats {
            articles: articles.len(),
            ..RunStats::default()
        };
        counter!("pipeline_articles_total").increment(articles.len() as u64);

        if articles.is_empty() {
            tracing::info!("no articles; nothing to cluster");
            return Ok((Vec::new(), stats));
        }

        let vectors = self
            .extractor
            .extract(&articles)
            .await
            .with_context(|| format!("{} feature extraction", self.extractor.name()))?;
        if vectors.len() != articles.len() {
            bail!(
                "extractor {} returned {} vectors for {} articles",
                self.extractor.name(),
                vectors.len(),
                articles.len()
            );
        }

        let labels = cluster(&vectors, &self.clustering);
        let clusters = assemble(articles, &labels)?;
        stats.clusters = clusters.len();
        counter!("pipeline_clusters_total").increment(clusters.len() as u64);
        if clusters.is_empty() {
            tracing::info!(articles = stats.articles, "no multi-article stories found");
            return Ok((Vec::new(), stats));
        }
        tracing::info!(
            articles = stats.articles,
            clusters = clusters.len(),
            "stories found"
        );

        let analyses =
            consolidate_all(self.client.as_ref(), &clusters, &self.consolidation, &mut stats).await;
        let (kept, dropped) = self.coherence.apply(analyses);
        stats.incoherent = dropped;
        counter!("coherence_dropped_total").increment(dropped as u64);

        tracing::info!(
            analysed = stats.analysed,
            skipped = stats.skipped(),
            incoherent = dropped,
            kept = kept.len(),
            "run finished"
        );
        Ok((kept, stats))
    }
}
