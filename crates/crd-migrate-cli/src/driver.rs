//! Pass driver
//!
//! Runs a single pass, or passes back to back with a pause between them.
//! Passes never overlap, and Ctrl-C is only acted on between passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crd_migrate::{
    create_client, DefinitionSource, KubeDefinitionSource, KubeDiscovery, KubeResourceStore,
    Migrator, RateLimiter, ResourceDiscovery, ResourceStore,
};

use crate::config::Settings;
use crate::{Error, Result};

/// Connect to the cluster and run the configured passes
pub async fn run(settings: Settings) -> Result<()> {
    let client =
        create_client(settings.kubeconfig.as_deref(), settings.context.as_deref()).await?;
    let limiter = Arc::new(RateLimiter::new(settings.qps, settings.burst));

    let migrator = Migrator::new(
        settings.migrator,
        Arc::new(KubeDiscovery::new(client.clone())),
        Arc::new(KubeResourceStore::new(client.clone(), limiter)),
        Arc::new(KubeDefinitionSource::new(client)),
    );

    info!(
        from = %migrator.config().source,
        to = %migrator.config().target,
        qps = settings.qps,
        burst = settings.burst,
        "Starting migration"
    );

    let Some(interval) = settings.interval else {
        return run_once(&migrator).await;
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl+c");
            return;
        }
        info!("Received shutdown signal, stopping after the current pass");
        let _ = shutdown_tx.send(true);
    });

    run_every(&migrator, interval, shutdown_rx).await
}

/// Run one pass, failing if anything was left unmigrated
pub async fn run_once<D, S, C>(migrator: &Migrator<D, S, C>) -> Result<()>
where
    D: ResourceDiscovery,
    S: ResourceStore,
    C: DefinitionSource,
{
    let report = migrator.run_pass().await?;
    if report.is_complete() {
        return Ok(());
    }

    Err(Error::Incomplete {
        failed: report.failed(),
        skipped: report.skipped.len(),
    })
}

/// Run passes until `shutdown` flips to true or a pass hits a
/// configuration error
pub async fn run_every<D, S, C>(
    migrator: &Migrator<D, S, C>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    D: ResourceDiscovery,
    S: ResourceStore,
    C: DefinitionSource,
{
    let mut pass: u64 = 0;

    loop {
        pass += 1;

        match migrator.run_pass().await {
            Ok(report) if report.is_complete() => {
                info!(pass, "Pass complete");
            }
            Ok(report) => {
                warn!(
                    pass,
                    failed = report.failed(),
                    skipped = report.skipped.len(),
                    "Pass incomplete, retrying after interval"
                );
            }
            // the API server may just be unavailable
            Err(e @ crd_migrate::Error::Discovery { .. }) => {
                error!(pass, error = %e, "Pass aborted, retrying after interval");
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                error!(pass, error = %e, "Pass failed, retrying after interval");
            }
        }

        if *shutdown.borrow() {
            return Ok(());
        }

        tokio::select! {
            Ok(()) = shutdown.changed() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
