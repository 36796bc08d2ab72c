use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TRANSFER_PORT: u16 = 33334;

/// Smallest workable chunk buffer: it must hold the action byte, the
/// metadata length prefix, and a compressed metadata frame at once.
pub const MIN_CHUNK_BUFFER: usize = 4 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_address: String,
    pub storage_root: PathBuf,
    pub worker_threads: usize,
    pub chunk_buffer_size: usize,
    /// Bound on each disk write during an upload, seconds.
    pub file_write_timeout_secs: u64,
    /// Bound on each socket write during a download; long, because the
    /// client paces consumption.
    pub socket_write_timeout_secs: u64,
    /// Log send-connections that match no pending request, and download
    /// paths that do not exist. The wire behavior stays a silent close
    /// either way.
    pub log_silent_drops: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: format!("0.0.0.0:{}", DEFAULT_TRANSFER_PORT),
            storage_root: PathBuf::from("./store"),
            worker_threads: 4,
            chunk_buffer_size: 64 * 1024,
            file_write_timeout_secs: 10,
            socket_write_timeout_secs: 100,
            log_silent_drops: true,
        }
    }
}

impl ServerConfig {
    pub fn load_or_create(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or("filebeam.toml");

        if std::path::Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)?;
            let config: ServerConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(config_file)?;
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_buffer_size < MIN_CHUNK_BUFFER {
            anyhow::bail!(
                "chunk_buffer_size {} is below the minimum of {}",
                self.chunk_buffer_size,
                MIN_CHUNK_BUFFER
            );
        }
        if self.worker_threads == 0 {
            anyhow::bail!("worker_threads must be at least 1");
        }
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if !self.storage_root.exists() {
            std::fs::create_dir_all(&self.storage_root)?;
            tracing::info!("Created storage root: {:?}", self.storage_root);
        }
        Ok(())
    }
}
