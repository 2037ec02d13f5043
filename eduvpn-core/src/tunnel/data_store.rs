//! Per-target key-value storage
//!
//! Static configurations keep their tunnel blob in the target's local
//! storage directory.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, EduVpnError};
use crate::types::TunnelBlob;

/// Per-target storage read by the orchestrator
pub trait DataStore: Send + Sync {
    /// The bundled tunnel configuration, if one has been imported
    fn read_static_tunnel_blob(&self) -> Result<Option<TunnelBlob>, EduVpnError>;
}

/// File name of the tunnel configuration inside a target's storage directory
const VPN_CONFIG_FILE_NAME: &str = "vpn_config";

/// Data store backed by a directory on disk
#[derive(Debug, Clone)]
pub struct FsDataStore {
    path: PathBuf,
}

impl FsDataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Import a tunnel configuration into this store
    pub fn write_static_tunnel_blob(&self, config: &str) -> Result<(), EduVpnError> {
        std::fs::create_dir_all(&self.path).map_err(|e| {
            EduVpnError::Config(ConfigError::IoError {
                message: format!("Failed to create storage directory: {}", e),
            })
        })?;
        std::fs::write(self.path.join(VPN_CONFIG_FILE_NAME), config)?;
        Ok(())
    }
}

impl DataStore for FsDataStore {
    fn read_static_tunnel_blob(&self) -> Result<Option<TunnelBlob>, EduVpnError> {
        match std::fs::read_to_string(self.path.join(VPN_CONFIG_FILE_NAME)) {
            Ok(contents) if contents.trim().is_empty() => Ok(None),
            Ok(contents) => Ok(Some(TunnelBlob::new(contents))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EduVpnError::Io(e)),
        }
    }
}
