//! Simulated remote endpoints.
//!
//! This module holds the device registry, the command resolver, failure
//! injection and the SSH/SFTP client facades that application code talks
//! to in place of a real network client.

pub mod client;
pub mod device;
pub mod failure;
pub mod registry;
pub mod response;
pub mod sftp;
pub mod traits;

/// Port used when none is given.
pub const DEFAULT_SSH_PORT: u16 = 22;

pub use client::{
    Channel, ChannelFile, ConnectOptions, ExecStreams, MissingHostKeyPolicy, SshClient,
};
pub use device::{Credentials, VirtualDevice};
pub use failure::FailureConfig;
pub use registry::Registry;
pub use response::{
    CallbackResponse, CommandKey, CommandOutput, CommandPattern, Response, ResponseTable,
    StaticResponse,
};
pub use sftp::{FileAttributes, SftpClient, SftpFile};
pub use traits::{FileTransfer, RemoteFile, RemoteShell};
