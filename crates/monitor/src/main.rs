//! Monitor daemon entry point.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use weft_common::MonitorConfig;
use weft_monitor::{build_router, MonitorState};
use weft_store::MemRegistry;
use weft_tpm::SoftTpm;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = MonitorConfig::from_env();
    info!(node = %cfg.node_id, "starting fabric monitor");

    // The monitor keeps its own TPM; its parent public key anchors
    // self-origin heartbeats that omit parent_pub_b64.
    let tpm = SoftTpm::open_from_env(&cfg.tpm_storage).context("failed to init TPM")?;
    info!(parent_pub = %tpm.parent_public_b64(), "parent public key");

    let state = Arc::new(MonitorState {
        parent_pub_b64: tpm.parent_public_b64().to_string(),
        registry: Arc::new(MemRegistry::new()),
        cfg: cfg.clone(),
    });

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("monitor listening on {bind_addr}");

    axum::serve(listener, build_router(state))
        .await
        .context("http server exited")?;
    Ok(())
}
