//! Persisted connection attempt
//!
//! Exactly one attempt (the most recent) is kept. Saving overwrites it. The
//! orchestrator is the only writer; the record is read once at startup to
//! resume a session that outlived the previous process.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::types::{ConnectableTarget, ConnectionAttempt};

/// Single-record store for the in-flight or last connection attempt
pub trait ConnectionAttemptStore: Send + Sync {
    /// Persist `attempt`, replacing any previous record
    fn save(&self, attempt: &ConnectionAttempt) -> Result<(), StoreError>;

    fn load_most_recent(&self) -> Result<Option<ConnectionAttempt>, StoreError>;

    /// Remove the record; clearing an empty store is not an error
    fn clear(&self) -> Result<(), StoreError>;
}

/// Default attempt file name inside the state directory
pub const ATTEMPT_FILE_NAME: &str = "connection_attempt.json";

/// Attempt store backed by a JSON file
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash never leaves a half-written record behind.
#[derive(Debug, Clone)]
pub struct JsonFileAttemptStore {
    path: PathBuf,
}

impl JsonFileAttemptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store using [`ATTEMPT_FILE_NAME`] inside `state_dir`
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(ATTEMPT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

impl ConnectionAttemptStore for JsonFileAttemptStore {
    fn save(&self, attempt: &ConnectionAttempt) -> Result<(), StoreError> {
        attempt.validate()?;

        let contents = serde_json::to_vec_pretty(attempt).map_err(|e| StoreError::WriteFailed {
            path: self.display_path(),
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::WriteFailed {
                path: self.display_path(),
                message: format!("Failed to create state directory: {}", e),
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, contents)
            .and_then(|_| std::fs::rename(&tmp_path, &self.path))
            .map_err(|e| StoreError::WriteFailed {
                path: self.display_path(),
                message: e.to_string(),
            })?;

        debug!(attempt_id = %attempt.attempt_id, path = ?self.path, "Saved connection attempt");
        Ok(())
    }

    fn load_most_recent(&self) -> Result<Option<ConnectionAttempt>, StoreError> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::ReadFailed {
                    path: self.display_path(),
                    message: e.to_string(),
                })
            }
        };

        let attempt: ConnectionAttempt =
            serde_json::from_slice(&contents).map_err(|e| StoreError::Corrupt {
                message: e.to_string(),
            })?;
        attempt.validate()?;

        debug!(attempt_id = %attempt.attempt_id, "Loaded connection attempt");
        Ok(Some(attempt))
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = ?self.path, "Cleared connection attempt");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::WriteFailed {
                path: self.display_path(),
                message: e.to_string(),
            }),
        }
    }
}

/// In-memory attempt store, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    attempt: Mutex<Option<ConnectionAttempt>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `attempt`
    pub fn with_attempt(attempt: ConnectionAttempt) -> Self {
        Self {
            attempt: Mutex::new(Some(attempt)),
        }
    }
}

impl ConnectionAttemptStore for MemoryAttemptStore {
    fn save(&self, attempt: &ConnectionAttempt) -> Result<(), StoreError> {
        attempt.validate()?;
        let mut slot = self.attempt.lock().map_err(|_| StoreError::WriteFailed {
            path: "memory".to_string(),
            message: "lock poisoned".to_string(),
        })?;
        *slot = Some(attempt.clone());
        Ok(())
    }

    fn load_most_recent(&self) -> Result<Option<ConnectionAttempt>, StoreError> {
        let slot = self.attempt.lock().map_err(|_| StoreError::ReadFailed {
            path: "memory".to_string(),
            message: "lock poisoned".to_string(),
        })?;
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut slot = self.attempt.lock().map_err(|_| StoreError::WriteFailed {
            path: "memory".to_string(),
            message: "lock poisoned".to_string(),
        })?;
        *slot = None;
        Ok(())
    }
}

/// An entry the user removed from their server list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRemoval {
    /// A single server, identified by base URL
    Server { base_url: String },
    /// An organization; every server reached through it goes with it
    Organization { org_id: String },
    /// A static configuration, identified by name
    StaticConfig { name: String },
}

impl TargetRemoval {
    /// Whether `target` belongs to the removed entry
    pub fn covers(&self, target: &ConnectableTarget) -> bool {
        match (self, target) {
            (TargetRemoval::Server { base_url }, ConnectableTarget::RemoteServer(server)) => {
                &server.base_url == base_url
            }
            (TargetRemoval::Organization { org_id }, ConnectableTarget::RemoteServer(server)) => {
                server.org_id.as_deref() == Some(org_id.as_str())
            }
            (TargetRemoval::StaticConfig { name }, ConnectableTarget::StaticConfig(config)) => {
                &config.name == name
            }
            _ => false,
        }
    }
}

/// Drop the persisted attempt if it refers to a removed server or organization
///
/// Returns `true` when the record was cleared; the caller then disables the
/// tunnel, since the session it describes no longer has a home. Servers and
/// organizations go through this same rule.
pub fn reconcile_removal(
    store: &dyn ConnectionAttemptStore,
    removal: &TargetRemoval,
) -> Result<bool, StoreError> {
    let attempt = match store.load_most_recent() {
        Ok(Some(attempt)) => attempt,
        Ok(None) => return Ok(false),
        Err(StoreError::Corrupt { message }) => {
            warn!("Discarding corrupt connection attempt during removal: {}", message);
            store.clear()?;
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    if removal.covers(&attempt.target) {
        info!(attempt_id = %attempt.attempt_id, target = %attempt.target, "Removed entry owned the persisted attempt, clearing it");
        store.clear()?;
        Ok(true)
    } else {
        Ok(false)
    }
}
