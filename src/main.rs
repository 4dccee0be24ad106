//! ratewatch — Azure rate-limit budget exporter.
//!
//! Polls Azure Resource Manager on a fixed cadence and republishes the
//! `x-ms-ratelimit-remaining-resource` budget as Prometheus metrics.
//! Transient failures are tolerated up to a ceiling; past it the daemon
//! exits non-zero so the supervisor can restart it.

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use tracing::{error, info};

mod auth;
mod azure;
mod config;
mod metrics;
mod poller;
mod server;

use auth::AadTokenProvider;
use azure::ResourceProbe;
use config::Config;
use metrics::PrometheusMetrics;
use poller::Poller;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ratewatch=info".into()),
        )
        .with_target(false)
        .init();

    info!("📡 ratewatch v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let registry = Registry::new();
    let metrics = Arc::new(
        PrometheusMetrics::register(&registry).context("Failed to register metrics")?,
    );

    let probe = ResourceProbe::new(azure::MANAGEMENT_ENDPOINT, &config.subscription_id)
        .context("Failed to build ARM probe")?;
    let tokens = Arc::new(AadTokenProvider::new(config.credentials.clone()));
    let poller = Poller::new(probe, tokens, metrics);

    // Exposition runs in the background; the poll loop owns the
    // foreground so an escalation takes the process down with it.
    let exposition_registry = registry.clone();
    let listen_addr = config.listen_addr;
    tokio::spawn(async move {
        if let Err(e) = server::serve(listen_addr, exposition_registry).await {
            error!("Metrics server failed: {e:#}");
        }
    });

    info!(
        subscription = %config.subscription_id,
        interval_secs = config.poll_interval_secs,
        "Poller ready"
    );

    poller::run_poller(poller, config.poll_interval_secs)
        .await
        .context("Rate-limit polling escalated to a fatal error")
}
