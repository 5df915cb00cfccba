//! Env-based daemon configuration.
//!
//! Both daemons are configured entirely from the process environment,
//! with the same defaulting rules as the deployment compose files:
//! `ADDRESS` falls back to `http://<NODE_ID>:<PORT>` so service-name
//! routing works out of the box.

use std::env;

/// Storage directory env var for the software TPM.
pub const TPM_STORAGE_ENV: &str = "FAKE_TPM_STORAGE";
/// Default TPM storage directory.
pub const DEFAULT_TPM_STORAGE: &str = "/data/tpm";

/// Node daemon configuration.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Unique node identifier; doubles as the TPM child id.
    pub node_id: String,
    /// HTTP listen port.
    pub port: u16,
    /// Address this node advertises to the monitor.
    pub address: String,
    /// DAG role label (auth/local/global).
    pub dag_type: String,
    /// Peer base URLs for attestation fanout.
    pub peers: Vec<String>,
    /// Monitor base URL; heartbeats are disabled when absent.
    pub monitor_url: Option<String>,
    /// External ledger database DSN (consumed by the SQL-backed store).
    pub database_url: Option<String>,
    /// TPM storage directory.
    pub tpm_storage: String,
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let node_id = env_or("NODE_ID", "default-node");
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let address = match env::var("ADDRESS") {
            Ok(a) if !a.is_empty() => a,
            _ => format!("http://{node_id}:{port}"),
        };
        Self {
            address,
            dag_type: env_or("DAG_TYPE", "local"),
            peers: split_list(&env::var("PEERS").unwrap_or_default()),
            monitor_url: env::var("MONITOR_URL").ok().filter(|s| !s.is_empty()),
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            tpm_storage: env_or(TPM_STORAGE_ENV, DEFAULT_TPM_STORAGE),
            node_id,
            port,
        }
    }
}

/// Monitor daemon configuration.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub node_id: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub tpm_storage: String,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self {
            node_id: env_or("NODE_ID", "monitor"),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            tpm_storage: env_or(TPM_STORAGE_ENV, DEFAULT_TPM_STORAGE),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// Split a comma-separated list, dropping empty segments.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
