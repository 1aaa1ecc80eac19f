//! Pipeline binary: load config, run, exit non-zero on any failure

use docpipe::{build_orchestrator, PipelineConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DOCPIPE_CONFIG").ok())
        .unwrap_or_else(|| "pipeline.toml".to_string());

    let config = PipelineConfig::from_file(&config_path)?;
    let orchestrator = build_orchestrator(config).await?;
    let status = orchestrator.run().await?;

    for result in status.results.iter().filter(|r| !r.success) {
        eprintln!(
            "FAILED {}: {} ({})",
            result.filename,
            result.error_message.as_deref().unwrap_or("unknown"),
            result.error_kind.as_deref().unwrap_or("unknown"),
        );
    }

    println!(
        "{}/{} documents indexed ({:.0}% success)",
        status.succeeded,
        status.total_documents,
        status.success_rate() * 100.0
    );

    if !status.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
