//! Error types for the eduVPN client
//!
//! This module defines all error types used throughout the application,
//! providing consistent error handling and user-friendly error messages.

use thiserror::Error;

/// Main error type for the eduVPN client
#[derive(Error, Debug)]
pub enum EduVpnError {
    /// Errors related to configuration loading/parsing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors raised while driving a connection
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Errors related to the persisted connection attempt
    #[error("Attempt store error: {0}")]
    Store(#[from] StoreError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Failed to save configuration file: {path}")]
    SaveFailed { path: String },

    #[error("Invalid URL for {field}: {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Coarse classification of connection failures
///
/// `PreconditionViolation` never travels inside a [`ConnectionError`]: misuse
/// of the orchestrator panics instead of returning an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserCancelled,
    AuthorizationFailed,
    NetworkUnavailable,
    MalformedRemoteResponse,
    TunnelActivationFailed,
    PreconditionViolation,
}

/// Failures of a single connection attempt
///
/// Every variant aborts the attempt in progress and returns the orchestrator
/// to idle. None of them are retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The authorization flow was cancelled by the user, by an overlapping
    /// request or by a timeout
    #[error("Authorization cancelled: {reason}")]
    UserCancelled { reason: CancelReason },

    #[error("Authorization failed: {reason}")]
    AuthorizationFailed { reason: String },

    /// The server rejected a previously obtained authorization
    #[error("Authorization expired, please sign in again")]
    AuthorizationExpired,

    #[error("Network unavailable: {reason}")]
    NetworkUnavailable { reason: String },

    #[error("Malformed response from server: {reason}")]
    MalformedRemoteResponse { reason: String },

    #[error("Tunnel activation failed: {reason}")]
    TunnelActivationFailed { reason: String },

    #[error("Tunnel deactivation failed: {reason}")]
    TunnelDeactivationFailed { reason: String },

    #[error("Failed to persist connection attempt: {reason}")]
    Store { reason: String },
}

/// Why an authorization flow ended without a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancelled from the UI
    User,
    /// Superseded by a newer request
    Superseded,
    /// The redirect did not arrive in time
    TimedOut,
    /// The authorization server reported that access was denied
    AccessDenied,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::User => write!(f, "cancelled by user"),
            CancelReason::Superseded => write!(f, "superseded by a new request"),
            CancelReason::TimedOut => write!(f, "timed out waiting for the browser"),
            CancelReason::AccessDenied => write!(f, "access denied"),
        }
    }
}

impl ConnectionError {
    /// True for every flavour of cancellation, so callers can skip the error banner
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, ConnectionError::UserCancelled { .. })
    }

    /// Map the error onto the coarse taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectionError::UserCancelled { .. } => ErrorKind::UserCancelled,
            ConnectionError::AuthorizationFailed { .. } | ConnectionError::AuthorizationExpired => {
                ErrorKind::AuthorizationFailed
            }
            ConnectionError::NetworkUnavailable { .. } => ErrorKind::NetworkUnavailable,
            ConnectionError::MalformedRemoteResponse { .. } => ErrorKind::MalformedRemoteResponse,
            ConnectionError::TunnelActivationFailed { .. }
            | ConnectionError::TunnelDeactivationFailed { .. }
            | ConnectionError::Store { .. } => ErrorKind::TunnelActivationFailed,
        }
    }

    /// Short human-readable summary suitable for an error banner
    pub fn summary(&self) -> String {
        match self {
            ConnectionError::UserCancelled { .. } => "Sign-in was cancelled".to_string(),
            ConnectionError::AuthorizationFailed { .. } => "Could not sign in to the server".to_string(),
            ConnectionError::AuthorizationExpired => {
                "Your session has expired, please sign in again".to_string()
            }
            ConnectionError::NetworkUnavailable { .. } => {
                "The server could not be reached".to_string()
            }
            ConnectionError::MalformedRemoteResponse { .. } => {
                "The server sent an unexpected response".to_string()
            }
            ConnectionError::TunnelActivationFailed { .. } => {
                "The VPN tunnel could not be started".to_string()
            }
            ConnectionError::TunnelDeactivationFailed { .. } => {
                "The VPN tunnel could not be stopped".to_string()
            }
            ConnectionError::Store { .. } => "The connection could not be saved".to_string(),
        }
    }
}

impl From<StoreError> for ConnectionError {
    fn from(error: StoreError) -> Self {
        ConnectionError::Store {
            reason: error.to_string(),
        }
    }
}

/// Connection attempt persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read attempt file {path}: {message}")]
    ReadFailed { path: String, message: String },

    #[error("Failed to write attempt file {path}: {message}")]
    WriteFailed { path: String, message: String },

    #[error("Stored attempt is corrupt: {message}")]
    Corrupt { message: String },

    #[error("Selected profile {profile_id} is not among the attempt's profiles")]
    UnknownSelectedProfile { profile_id: String },
}

/// Abort on a violated orchestrator precondition
///
/// Preconditions guard against programming errors such as enabling a tunnel
/// that is already enabled; they are never recovered from.
#[track_caller]
pub fn precondition_violated(what: &str) -> ! {
    tracing::error!(kind = ?ErrorKind::PreconditionViolation, "Precondition violated: {}", what);
    panic!("precondition violated: {}", what);
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EduVpnError>;
