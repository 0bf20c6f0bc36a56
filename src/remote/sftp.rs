//! SFTP-shaped access to a device's remote filesystem.
//!
//! An `SftpClient` is bound to two filesystems: the remote one owned by the
//! connected device and the registry's shared local one. Writes through an
//! [`SftpFile`] land in the filesystem immediately; there is no buffering,
//! so a reader opened before `close` already sees the data.
//!
//! Every operation first checks that the SSH session is still open and that
//! the registry still holds the device whose filesystem the client is bound
//! to. After `Registry::cleanup` or a re-registration the client fails with
//! `NotRegistered` instead of touching a filesystem nobody owns.

use crate::error::{Error, Result};
use crate::remote::registry::Registry;
use crate::remote::traits::{FileTransfer, RemoteFile};
use crate::vfs::{FileRecord, OpenMode, VirtualFilesystem};
use log::debug;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Subset of file attributes the simulation tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub size: u64,
}

#[derive(Debug)]
struct SftpInner {
    registry: Registry,
    key: String,
    remote: VirtualFilesystem,
    local: VirtualFilesystem,
    session_open: Arc<AtomicBool>,
    closed: AtomicBool,
}

/// File-transfer client handed out by `SshClient::open_sftp`.
///
/// Clones share state. The SSH client hands out the same instance until it
/// is closed; `open_sftp` after `close` starts a fresh one.
#[derive(Debug, Clone)]
pub struct SftpClient {
    inner: Arc<SftpInner>,
}

impl SftpClient {
    /// Binds a client to the device registered under `key`.
    pub(crate) fn new(
        registry: Registry,
        key: impl Into<String>,
        session_open: Arc<AtomicBool>,
    ) -> Result<Self> {
        let key = key.into();
        let (remote, local) = registry.with_device(&key, |device| {
            (device.filesystem().clone(), device.local_filesystem().clone())
        })?;
        Ok(Self {
            inner: Arc::new(SftpInner {
                registry,
                key,
                remote,
                local,
                session_open,
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst)
            || !self.inner.session_open.load(Ordering::SeqCst)
        {
            return Err(Error::not_connected());
        }
        let bound = self.inner.registry.with_device(&self.inner.key, |device| {
            device.filesystem().same_as(&self.inner.remote)
        });
        match bound {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(Error::NotRegistered {
                key: self.inner.key.clone(),
            }),
        }
    }

    /// Returns true when both handles are the same client.
    pub fn same_as(&self, other: &SftpClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.ensure_open().is_err()
    }

    pub fn remote_filesystem(&self) -> &VirtualFilesystem {
        &self.inner.remote
    }

    pub fn local_filesystem(&self) -> &VirtualFilesystem {
        &self.inner.local
    }

    /// Opens a remote file. `"w"` creates or truncates, `"r"` requires the
    /// file to exist.
    pub fn open(&self, path: &str, mode: &str) -> Result<SftpFile> {
        self.ensure_open()?;
        let mode = OpenMode::parse(mode)?;
        match mode {
            OpenMode::Write => self.inner.remote.truncate(path),
            OpenMode::Read => {
                if !self.inner.remote.contains(path) {
                    return Err(Error::FileNotFound {
                        path: path.to_string(),
                    });
                }
            }
        }
        debug!("sftp: open {} ({:?})", path, mode);
        Ok(SftpFile {
            client: self.clone(),
            path: path.to_string(),
            mode,
            closed: false,
        })
    }

    /// Copies `localpath` from the local filesystem to `remotepath`.
    pub fn put(&self, localpath: &str, remotepath: &str) -> Result<FileAttributes> {
        self.ensure_open()?;
        let content = self.inner.local.read(localpath)?;
        let size = content.len() as u64;
        debug!("sftp: put {} -> {} ({} bytes)", localpath, remotepath, size);
        self.inner.remote.add_file(remotepath, FileRecord::new(content));
        Ok(FileAttributes { size })
    }

    /// Copies `remotepath` to `localpath` on the local filesystem.
    pub fn get(&self, remotepath: &str, localpath: &str) -> Result<()> {
        self.ensure_open()?;
        let content = self.inner.remote.read(remotepath)?;
        debug!(
            "sftp: get {} -> {} ({} bytes)",
            remotepath,
            localpath,
            content.len()
        );
        self.inner.local.add_file(localpath, FileRecord::new(content));
        Ok(())
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .remote
            .remove_file(path)
            .map(|_| ())
            .ok_or_else(|| Error::FileNotFound {
                path: path.to_string(),
            })
    }

    pub fn stat(&self, path: &str) -> Result<FileAttributes> {
        self.ensure_open()?;
        self.inner
            .remote
            .get_file(path)
            .map(|record| FileAttributes {
                size: record.len() as u64,
            })
            .ok_or_else(|| Error::FileNotFound {
                path: path.to_string(),
            })
    }

    /// Names of the remote files directly under `dir`, sorted.
    pub fn listdir(&self, dir: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .inner
            .remote
            .paths()
            .into_iter()
            .filter_map(|path| {
                let name = path.strip_prefix(&prefix)?;
                (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
            })
            .collect())
    }

    /// Closes the client. Idempotent.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

impl FileTransfer for SftpClient {
    type File = SftpFile;

    fn open(&self, path: &str, mode: &str) -> Result<SftpFile> {
        SftpClient::open(self, path, mode)
    }

    fn put(&self, localpath: &str, remotepath: &str) -> Result<u64> {
        SftpClient::put(self, localpath, remotepath).map(|attrs| attrs.size)
    }

    fn get(&self, remotepath: &str, localpath: &str) -> Result<()> {
        SftpClient::get(self, remotepath, localpath)
    }

    fn close(&self) {
        SftpClient::close(self)
    }
}

/// Handle to a remote file opened through [`SftpClient::open`].
///
/// The handle stops working once its client, the SSH session or the
/// device goes away.
#[derive(Debug)]
pub struct SftpFile {
    client: SftpClient,
    path: String,
    mode: OpenMode,
    closed: bool,
}

impl SftpFile {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn ensure_usable(&self, wanted: OpenMode) -> Result<()> {
        if self.closed {
            return Err(Error::FileClosed {
                path: self.path.clone(),
            });
        }
        self.client.ensure_open()?;
        if self.mode != wanted {
            let what = match wanted {
                OpenMode::Read => "reading",
                OpenMode::Write => "writing",
            };
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("File not open for {}", what),
            )));
        }
        Ok(())
    }

    /// Whole current content of the file. Repeated reads return the same bytes.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        self.ensure_usable(OpenMode::Read)?;
        self.client.inner.remote.read(&self.path)
    }

    /// Content decoded as UTF-8, invalid sequences replaced.
    pub fn read_to_string(&mut self) -> Result<String> {
        self.read()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Appends `data` to the file.
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> Result<usize> {
        self.ensure_usable(OpenMode::Write)?;
        let data = data.as_ref();
        self.client.inner.remote.append(&self.path, data)?;
        Ok(data.len())
    }

    /// Closes the handle. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl RemoteFile for SftpFile {
    fn read(&mut self) -> Result<Vec<u8>> {
        SftpFile::read(self)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        SftpFile::write(self, data)
    }

    fn close(&mut self) {
        SftpFile::close(self)
    }
}
