//! Node daemon entry point.
//!
//! Initialization flow:
//! 1. Read configuration from the environment.
//! 2. Open the software TPM (fatal on any init error).
//! 3. Create this node's TPM child (`policy = "auth-node"`).
//! 4. Wire the ledger store and shared state.
//! 5. Start the heartbeat emitter when `MONITOR_URL` is set.
//! 6. Serve the HTTP surface.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use weft_common::NodeConfig;
use weft_node::{build_router, heartbeat, AppState};
use weft_store::MemStore;
use weft_tpm::SoftTpm;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = NodeConfig::from_env();
    info!(
        node = %cfg.node_id,
        addr = %cfg.address,
        dag = %cfg.dag_type,
        peers = cfg.peers.len(),
        "starting fabric node"
    );

    let tpm = Arc::new(
        SoftTpm::open_from_env(&cfg.tpm_storage).context("failed to init TPM")?,
    );
    // Stable across restarts under the same master key.
    info!(parent_pub = %tpm.parent_public_b64(), "parent public key");

    let (_, att) = tpm
        .create_child(&cfg.node_id, "auth-node")
        .context("create child failed")?;
    info!(child_pub = %att.child_pub_b64, counter = att.counter, "node child identity ready");

    let http = reqwest::Client::builder()
        .timeout(heartbeat::REQUEST_TIMEOUT)
        .build()
        .context("failed to build http client")?;

    let state = Arc::new(AppState {
        tpm,
        store: Arc::new(MemStore::new()),
        http,
        cfg: cfg.clone(),
    });

    match &cfg.monitor_url {
        Some(monitor_url) => {
            tokio::spawn(heartbeat::run(state.clone(), monitor_url.clone()));
        }
        None => info!("MONITOR_URL not set; heartbeats disabled"),
    }

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("node listening on {bind_addr}");

    axum::serve(listener, build_router(state))
        .await
        .context("http server exited")?;
    Ok(())
}
