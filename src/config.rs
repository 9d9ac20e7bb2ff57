//! Process configuration (spec §6 "Configuration"), loaded from a TOML file
//! via `serde`. Grounded on the `serde`+`toml` config pattern used by
//! `redhat-performance-rusty-comms` and `snowdamiz-mesh-lang`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Everything a process needs to stand up its role: where the scripts live,
/// who it is on the IPC mesh, how many workers exist, and every endpoint the
/// three transports bind or dial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory the VM host loads scripts from on init and reload.
    pub script_dir: PathBuf,

    /// This instance's identity on the IPC mesh.
    pub app_id: String,

    /// Number of worker processes/VMs (tunnel ids `0..worker_count`).
    pub worker_count: u32,

    /// Tunnel id the "other" process is addressed by.
    pub other_tunnel_id: i32,

    /// Tunnel ids assigned to each worker, index-aligned with worker index.
    pub worker_tunnel_ids: Vec<i32>,

    /// Address the other process's UDP endpoint binds.
    pub udp_bind_addr: String,

    /// Addresses the other process's IPC-stream endpoint listens on.
    pub ipc_listen_addrs: Vec<String>,

    /// Peer addresses the other process dials out to on startup.
    pub ipc_connect_addrs: Vec<String>,

    /// Address each worker's WebSocket endpoint listens on.
    pub websocket_listen_addr: String,
}

impl AppConfig {
    /// Reads and parses a TOML config file from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|source| Error::ConfigParseError {
            message: source.to_string(),
        })
    }

    pub fn worker_tunnel_id(&self, worker_idx: i32) -> Option<i32> {
        self.worker_tunnel_ids.get(worker_idx as usize).copied()
    }

    pub fn all_worker_tunnel_ids(&self) -> &[i32] {
        &self.worker_tunnel_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
        script_dir = "./scripts"
        app_id = "node-a"
        worker_count = 2
        other_tunnel_id = 100
        worker_tunnel_ids = [0, 1]
        udp_bind_addr = "0.0.0.0:9100"
        ipc_listen_addrs = ["0.0.0.0:9200"]
        ipc_connect_addrs = []
        websocket_listen_addr = "0.0.0.0:9000"
        "#
    }

    #[test]
    fn parses_well_formed_config() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        assert_eq!(config.app_id, "node-a");
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.worker_tunnel_id(1), Some(1));
        assert_eq!(config.worker_tunnel_id(5), None);
    }

    #[test]
    fn load_surfaces_a_parse_error_for_malformed_toml() {
        let dir = std::env::temp_dir().join(format!(
            "tunnelmesh-config-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(AppConfig::load(&path).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
