use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axisrun::{AppConfig, BackendKind, Orchestrator};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path).await?,
        None => AppConfig::default(),
    };
    info!(backend = %config.backend, "starting single-axis demo");

    let orchestrator = Arc::new(Orchestrator::new(config));

    // Log every published position while the demo runs.
    let mut feed = orchestrator.subscribe();
    let watcher = tokio::spawn(async move {
        while feed.changed().await.is_ok() {
            let status = feed.borrow_and_update().clone();
            match &status.message {
                Some(message) => info!(position = status.position, "{}", message),
                None => info!(position = status.position, phase = ?status.phase(), "status"),
            }
        }
    });

    orchestrator
        .connect(BackendKind::Simulator)
        .await
        .context("connect")?;
    orchestrator.servo_on().await?;
    orchestrator.home().await?;
    orchestrator.apply_soft_limit().await?;

    let profile = orchestrator.preview(25.0).await?;
    info!(summary = %profile.summary(), shape = ?profile.shape(), duration = profile.duration(), "preview");

    let report = orchestrator.plan_and_execute(25.0).await?;
    info!(outcome = ?report.outcome, applied = report.applied, position = report.status.position, "execution done");

    // Start a long move and stop it part way.
    let run = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.plan_and_execute(-100.0).await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    orchestrator.stop().await?;
    let report = run.await??;
    info!(outcome = ?report.outcome, applied = report.applied, position = report.status.position, "interrupted run");

    orchestrator.jog_positive().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    orchestrator.jog_stop().await?;

    if let Err(e) = orchestrator.plan_and_execute(900.0).await {
        info!(code = e.code(), "rejected as expected: {}", e);
    }

    orchestrator.disconnect().await?;
    watcher.abort();
    Ok(())
}
