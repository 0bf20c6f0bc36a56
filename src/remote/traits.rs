//! Client-facing traits.
//!
//! Application code written against these traits can run on the simulated
//! client in tests and on a real SSH client elsewhere.

use crate::error::Result;

/// Remote command execution and session lifecycle.
pub trait RemoteShell {
    type Stream: std::io::Read;
    type Sftp: FileTransfer;

    fn connect(
        &mut self,
        hostname: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<()>;

    /// Runs `command`, returning `(stdin, stdout, stderr)`.
    fn exec_command(&mut self, command: &str)
        -> Result<(Self::Stream, Self::Stream, Self::Stream)>;

    fn open_sftp(&mut self) -> Result<Self::Sftp>;

    fn close(&mut self);
}

/// File transfer over an open session.
pub trait FileTransfer {
    type File: RemoteFile;

    fn open(&self, path: &str, mode: &str) -> Result<Self::File>;

    /// Copies a local file to the remote side.
    fn put(&self, localpath: &str, remotepath: &str) -> Result<u64>;

    /// Copies a remote file to the local side.
    fn get(&self, remotepath: &str, localpath: &str) -> Result<()>;

    fn close(&self);
}

/// An open remote file.
pub trait RemoteFile {
    fn read(&mut self) -> Result<Vec<u8>>;

    fn write(&mut self, data: &[u8]) -> Result<usize>;

    fn close(&mut self);
}
