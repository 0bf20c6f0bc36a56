//! In-memory SSH/SFTP endpoints for testing remote-execution code.
//!
//! Register virtual devices in a [`Registry`], point an [`SshClient`] at it
//! and the code under test can connect, run commands and move files without
//! a network or a remote host.
//!
//! ```rust,no_run
//! use sshmock::remote::{Credentials, Registry, ResponseTable, SshClient, StaticResponse};
//!
//! let registry = Registry::new();
//! registry.register_device(
//!     "build-01",
//!     22,
//!     ResponseTable::new().with("uname -m", StaticResponse::stdout("aarch64\n")),
//!     Some(Credentials::new("ci", "secret")),
//!     None,
//! );
//!
//! let mut client = SshClient::with_registry(registry.clone());
//! client.connect("build-01", 22, Some("ci"), Some("secret"))?;
//! let (_stdin, mut stdout, _stderr) = client.exec_command("uname -m")?;
//! assert_eq!(stdout.read_string(), "aarch64\n");
//! registry.assert_command_was_executed("build-01", 22, "uname -m");
//! # Ok::<(), sshmock::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod remote;
pub mod vfs;

pub use error::{Error, Result, SshMockError};
pub use remote::{Registry, SshClient};
