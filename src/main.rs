//! speech-datasets - download, verify, extract and normalize speech corpora

use anyhow::{Context, Result};
use speech_datasets::config::Config;
use speech_datasets::pipeline::{Pipeline, RunSummary};
use speech_datasets::telemetry;

fn main() -> Result<()> {
    let config = Config::load()?;

    telemetry::init(&config.telemetry.level, &config.paths.log_path)?;
    tracing::info!("speech-datasets starting");

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let outcome = runtime.block_on(run(config));

    // Don't wait on an in-flight download after Ctrl+C
    runtime.shutdown_background();

    match outcome {
        Ok(summary) => {
            tracing::info!(
                downloaded = summary.downloaded,
                already_present = summary.already_present,
                redownloaded = summary.redownloaded,
                extracted = summary.extracted,
                extraction_skipped = summary.extraction_skipped,
                extraction_failures = summary.extraction_failures.len(),
                audio_converted = summary.audio.converted,
                audio_skipped = summary.audio.skipped,
                audio_failed = summary.audio.failed,
                originals_deleted = summary.audio.originals_deleted,
                "run summary"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("data collection failed: {e:#}");
            Err(e)
        }
    }
}

async fn run(config: Config) -> Result<RunSummary> {
    // The pipeline is blocking I/O end to end; it gets one blocking worker
    let worker = tokio::task::spawn_blocking(move || Pipeline::from_config(config)?.run());

    tokio::select! {
        joined = worker => joined.context("pipeline worker panicked")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; partial downloads restart from scratch on the next run");
            anyhow::bail!("interrupted by user")
        }
    }
}
