// tests/config_env.rs
use factfirst_news::cluster::ClusteringParams;
use factfirst_news::completion::build_client_from_config;
use factfirst_news::config::{CompletionConfig, EngineConfig, FeatureStrategy};
use factfirst_news::consolidate::AnalysisMode;
use std::{env, fs};

#[serial_test::serial]
#[test]
fn engine_config_env_path_then_defaults() {
    // Isolate CWD so the repo's own config/ is not read.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var("ENGINE_CONFIG_PATH");

    // 1) Nothing on disk → defaults
    let cfg = EngineConfig::load().unwrap();
    assert_eq!(cfg.features.strategy, FeatureStrategy::Lexical);
    assert_eq!(cfg.clustering().name(), "dbscan");

    // 2) Default path under ./config/
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(
        tmp.path().join("config/engine.toml"),
        "[consolidation]\nmode = \"narrative\"\n",
    )
    .unwrap();
    let cfg = EngineConfig::load().unwrap();
    assert_eq!(cfg.consolidation.mode, AnalysisMode::Narrative);

    // 3) ENV wins
    let p_env = tmp.path().join("other.toml");
    fs::write(
        &p_env,
        r#"
[features]
strategy = "semantic"

[clustering]
algorithm = "hdbscan"
min_cluster_size = 3

[coherence]
exclusion_phrases = ["off topic"]
"#,
    )
    .unwrap();
    env::set_var("ENGINE_CONFIG_PATH", p_env.display().to_string());
    let cfg = EngineConfig::load().unwrap();
    assert_eq!(cfg.features.strategy, FeatureStrategy::Semantic);
    let ClusteringParams::Hdbscan(h) = cfg.clustering() else {
        panic!("expected hdbscan");
    };
    assert_eq!(h.min_cluster_size, 3);
    assert_eq!(h.min_samples, None);
    assert_eq!(cfg.coherence.exclusion_phrases, vec!["off topic".to_string()]);
    assert_eq!(cfg.consolidation.mode, AnalysisMode::Stance);

    // 4) Broken TOML is an error, not silently defaults
    fs::write(&p_env, "[features\nstrategy = ").unwrap();
    assert!(EngineConfig::load().is_err());

    env::remove_var("ENGINE_CONFIG_PATH");
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn completion_key_resolves_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("completion.json");
    fs::write(
        &p,
        r#"{"enabled": true, "provider": "GEMINI", "model": "gemini-1.5-flash", "api_key": "ENV"}"#,
    )
    .unwrap();

    env::set_var("GOOGLE_API_KEY", "test-google-key");
    let cfg = CompletionConfig::load_from_file(&p).unwrap();
    assert_eq!(cfg.provider, "gemini");
    assert_eq!(cfg.api_key, "test-google-key");

    env::remove_var("GOOGLE_API_KEY");
    let err = CompletionConfig::load_from_file(&p).unwrap_err();
    assert!(err.to_string().contains("GOOGLE_API_KEY"));
}

#[serial_test::serial]
#[test]
fn client_factory_honours_test_mode_and_enabled_flag() {
    env::remove_var("COMPLETION_TEST_MODE");

    let disabled = CompletionConfig::default();
    assert_eq!(
        build_client_from_config(&disabled).unwrap().provider_name(),
        "disabled"
    );

    let openai = CompletionConfig {
        enabled: true,
        provider: "openai".into(),
        api_key: "k".into(),
        ..CompletionConfig::default()
    };
    assert_eq!(build_client_from_config(&openai).unwrap().provider_name(), "openai");

    let unknown = CompletionConfig {
        enabled: true,
        provider: "llama".into(),
        ..CompletionConfig::default()
    };
    assert!(build_client_from_config(&unknown).is_err());

    env::set_var("COMPLETION_TEST_MODE", "mock");
    assert_eq!(build_client_from_config(&openai).unwrap().provider_name(), "mock");
    assert_eq!(build_client_from_config(&disabled).unwrap().provider_name(), "mock");
    env::remove_var("COMPLETION_TEST_MODE");
}

#[serial_test::serial]
#[test]
fn semantic_embedder_key_can_be_literal() {
    env::remove_var("OPENAI_API_KEY");
    let cfg = EngineConfig::from_toml_str(
        r#"
[features]
strategy = "semantic"

[features.semantic]
base_url = "http://localhost:8080/v1"
api_key = "local-key"
"#,
    )
    .unwrap();
    assert_eq!(cfg.features.semantic.api_key, "local-key");
    assert!(factfirst_news::Pipeline::from_config(&cfg, &CompletionConfig::default()).is_ok());

    let default_key = EngineConfig::from_toml_str("[features]\nstrategy = \"semantic\"\n").unwrap();
    assert_eq!(default_key.features.semantic.api_key, "ENV");
    assert!(factfirst_news::Pipeline::from_config(&default_key, &CompletionConfig::default()).is_err());
}
