use alloc_churn::{config, harness, telemetry};
use anyhow::{Context, Result};
use config::ChurnConfig;
use harness::{HarnessError, Orchestrator, StdoutSink};
use std::sync::Arc;
use telemetry::init_tracing;
use tracing::info;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = ChurnConfig::load()?;

    // One pool thread per worker so allocation phases run in parallel;
    // worker 0 runs on this thread inside `block_on`.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.threads)
        .thread_name("churn-worker")
        .enable_time()
        .build()
        .map_err(HarnessError::Spawn)
        .context("creating churn workers")?;

    let summary = runtime.block_on(async {
        Orchestrator::new(cfg, Arc::new(StdoutSink))
            .run_to_completion()
            .await
    })?;

    info!(workers = summary.workers, "all workers done");
    Ok(())
}
