// tests/metrics_pipeline.rs
#![cfg(feature = "strict-metrics")]
use std::sync::Arc;

use factfirst_news::completion::MockCompletion;
use factfirst_news::config::EngineConfig;
use factfirst_news::features::tfidf::{LexicalExtractor, LexicalParams};
use factfirst_news::ingest::providers::RssFeedSource;
use factfirst_news::{ArticleSource, Pipeline};
use metrics_exporter_prometheus::PrometheusBuilder;

#[tokio::test]
async fn metrics_exposed_after_run() {
    // Install a local recorder for the test
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");

    let xml = std::fs::read_to_string("tests/fixtures/world_feed.xml").expect("fixture");
    let source: Box<dyn ArticleSource> = Box::new(RssFeedSource::from_fixture_str("world", &xml));
    let p = Pipeline::new(
        vec![source],
        Box::new(LexicalExtractor::new(LexicalParams::default())),
        Arc::new(MockCompletion::canned()),
        &EngineConfig::default(),
    );
    let out = p.run().await.expect("run");
    assert_eq!(out.len(), 1);

    // Scrape metrics text and check series presence by substring
    let text = handle.render();
    for name in [
        "ingest_articles_total",
        "pipeline_articles_total",
        "pipeline_clusters_total",
        "consolidation_ok_total",
        "coherence_dropped_total",
        "pipeline_run_ms",
    ] {
        assert!(text.contains(name), "missing series {name}");
    }
}
