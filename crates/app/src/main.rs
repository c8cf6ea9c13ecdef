//! Mast webhook entrypoint.

#![forbid(unsafe_code)]

mod config;
mod view;
mod web;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mast_api::InProcApi;
use mast_fetch::{ConfigFetcher, ReqwestClient, RetryPolicy, TrustedOrigin};
use mast_kubehub::KubeCluster;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

use crate::config::Config;

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let env = std::env::var("MAST_LOG").unwrap_or_else(|_| default.to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(h) => Some(h),
        Err(e) => {
            warn!(error = %e, "failed to install metrics recorder; /_/metrics will be empty");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed");
    }
    info!("shutting down");
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cfg = Config::parse();
    init_tracing(cfg.debug);
    let metrics = init_metrics();

    let auth = TrustedOrigin::new(&cfg.artifactory_origin, &cfg.artifactory_user, &cfg.artifactory_pwd)
        .context("parsing ARTIFACTORY_ORIGIN")?;
    let http = ReqwestClient::new(Some(auth), RetryPolicy::with_max_retries(cfg.fetch_retries), cfg.fetch_timeout())
        .context("building http client")?;
    let cluster = KubeCluster::try_default().await.context("connecting to the cluster")?;
    let api = InProcApi::new(ConfigFetcher::new(Arc::new(http)), Arc::new(cluster), mast_core::random_ids());

    let state = web::AppState::new(Arc::new(api), &cfg.url_scheme, metrics).context("loading status page template")?;
    let app = web::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port))
        .await
        .with_context(|| format!("binding port {}", cfg.port))?;
    info!(port = cfg.port, origin = %cfg.artifactory_origin, scheme = %cfg.url_scheme, "mast listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}
