//! Injectable connection failures.
//!
//! A device carrying a `FailureConfig` refuses every `connect` with the
//! error the variant describes. The errors are shaped like the ones a real
//! client surfaces: name resolution, timeouts and refusals come back as
//! `std::io::Error` kinds, authentication as `AuthenticationFailed`.

use crate::error::Error;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

/// A connection failure to return in place of a successful `connect`.
#[derive(Clone)]
pub enum FailureConfig {
    /// Name resolution fails for `hostname`.
    Dns { hostname: String },
    /// The TCP connect times out.
    Timeout,
    /// The server rejects authentication regardless of credentials.
    Authentication,
    /// The server actively refuses the connection.
    ConnectionRefused,
    /// Any caller-supplied error.
    Custom(Arc<dyn StdError + Send + Sync>),
}

impl FailureConfig {
    pub fn dns(hostname: impl Into<String>) -> Self {
        Self::Dns {
            hostname: hostname.into(),
        }
    }

    pub fn custom<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(error))
    }

    /// Short, stable name of the variant, used in logs and fixtures.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dns { .. } => "dns",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::ConnectionRefused => "connection_refused",
            Self::Custom(_) => "custom",
        }
    }

    /// Builds the error a connection attempt to `host:port` fails with.
    pub fn to_error(&self, host: &str, port: u16) -> Error {
        match self {
            Self::Dns { hostname } => Error::Io(io::Error::other(format!(
                "failed to lookup address information: Name or service not known ({})",
                hostname
            ))),
            Self::Timeout => Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connection to {}:{} timed out", host, port),
            )),
            Self::Authentication => Error::AuthenticationFailed { username: None },
            Self::ConnectionRefused => Error::NoValidConnections {
                message: format!("Unable to connect to port {} on {}", port, host),
                errors: vec![((host.to_string(), port), io::ErrorKind::ConnectionRefused)],
            },
            Self::Custom(inner) => Error::Custom(Arc::clone(inner)),
        }
    }
}

impl fmt::Debug for FailureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns { hostname } => f.debug_struct("Dns").field("hostname", hostname).finish(),
            Self::Timeout => f.write_str("Timeout"),
            Self::Authentication => f.write_str("Authentication"),
            Self::ConnectionRefused => f.write_str("ConnectionRefused"),
            Self::Custom(inner) => f.debug_tuple("Custom").field(&inner.to_string()).finish(),
        }
    }
}
