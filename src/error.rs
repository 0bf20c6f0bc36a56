use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshMockError {
    #[error("Remote device not registered: {key} (did you forget to call register_device?)")]
    NotRegistered { key: String },

    #[error("Authentication failed")]
    AuthenticationFailed { username: Option<String> },

    #[error("No valid connections: {message}")]
    NoValidConnections {
        message: String,
        /// Per-endpoint causes, keyed by `(host, port)`.
        errors: Vec<((String, u16), std::io::ErrorKind)>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(Arc<dyn StdError + Send + Sync>),

    #[error("No valid response for this command: {command}")]
    UnresolvedCommand { command: String },

    #[error("No such file: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported file mode: {mode}")]
    UnsupportedMode { mode: String },

    #[error("File is closed: {path}")]
    FileClosed { path: String },

    #[error("Invalid command pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("No response registered for {key} on {host}")]
    ResponseNotFound { host: String, key: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Fixture error: {0}")]
    Config(String),
}

impl SshMockError {
    pub(crate) fn not_connected() -> Self {
        Self::NoValidConnections {
            message: "No valid connection".to_string(),
            errors: Vec::new(),
        }
    }

    /// Returns the underlying `io::ErrorKind` for network-shaped failures.
    ///
    /// Refusals are reported through `NoValidConnections` the same way the
    /// imitated client aggregates per-address socket errors.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io(e) => Some(e.kind()),
            Self::NoValidConnections { errors, .. } => errors.first().map(|(_, kind)| *kind),
            _ => None,
        }
    }
}

pub type Error = SshMockError;
pub type Result<T> = std::result::Result<T, Error>;
