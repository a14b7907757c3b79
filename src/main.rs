//! `factfirst`: one run of the story engine.
//! Fetches the configured feeds, clusters them into stories and prints one
//! consolidated analysis per story as pretty JSON on stdout.

use std::process::ExitCode;

use anyhow::Context;
use factfirst_news::config::{CompletionConfig, EngineConfig};
use factfirst_news::Pipeline;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const GENERIC_ERROR: &str = "An internal server error occurred. See server logs for details.";

/// Logs go to stderr so stdout stays valid JSON.
/// `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("factfirst=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

async fn run() -> anyhow::Result<String> {
    let engine = EngineConfig::load().context("load engine config")?;
    let completion = CompletionConfig::load().context("load completion config")?;
    let pipeline = Pipeline::from_config(&engine, &completion)?;

    let (analyses, stats) = pipeline.run_detailed().await?;
    tracing::info!(?stats, "run stats");
    serde_json::to_string_pretty(&analyses).context("serialize analyses")
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = ?e, "run failed");
            println!("{}", serde_json::json!({ "error": GENERIC_ERROR }));
            ExitCode::FAILURE
        }
    }
}
