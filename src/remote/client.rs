//! Drop-in SSH client backed by a [`Registry`].
//!
//! `SshClient` follows the connect / exec / open-sftp / close life cycle of
//! a real client, but every call is answered from the registered virtual
//! device instead of the network.

use crate::error::{Error, Result};
use crate::remote::device::device_key;
use crate::remote::registry::Registry;
use crate::remote::response::CommandOutput;
use crate::remote::sftp::SftpClient;
use crate::remote::traits::RemoteShell;
use crate::remote::DEFAULT_SSH_PORT;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host key policies accepted (and ignored) by [`SshClient::set_missing_host_key_policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingHostKeyPolicy {
    AutoAdd,
    Warning,
    #[default]
    Reject,
}

/// Arguments of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Extra options (timeouts, banner settings, ...). Recorded, not interpreted.
    pub extra: BTreeMap<String, String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_SSH_PORT,
            username: None,
            password: None,
            extra: BTreeMap::new(),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// Channel shared by the three streams of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    exit_status: i32,
}

impl Channel {
    /// Exit status of the command; 0 unless the response set one.
    pub fn recv_exit_status(&self) -> i32 {
        self.exit_status
    }

    /// Always true: the simulated command has finished when `exec_command` returns.
    pub fn exit_status_ready(&self) -> bool {
        true
    }
}

/// One of the byte streams returned by [`SshClient::exec_command`].
#[derive(Debug, Clone)]
pub struct ChannelFile {
    data: Cursor<Vec<u8>>,
    channel: Arc<Channel>,
}

impl ChannelFile {
    fn new(data: Vec<u8>, channel: Arc<Channel>) -> Self {
        Self {
            data: Cursor::new(data),
            channel,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Reads everything not consumed yet.
    pub fn read_all(&mut self) -> Vec<u8> {
        let start = (self.data.position() as usize).min(self.data.get_ref().len());
        let rest = self.data.get_ref()[start..].to_vec();
        self.data.set_position(self.data.get_ref().len() as u64);
        rest
    }

    /// Remaining content decoded as UTF-8, invalid sequences replaced.
    pub fn read_string(&mut self) -> String {
        String::from_utf8_lossy(&self.read_all()).into_owned()
    }

    /// Remaining content split into lines, line endings kept.
    pub fn readlines(&mut self) -> Vec<String> {
        self.read_string()
            .split_inclusive('\n')
            .map(str::to_string)
            .collect()
    }
}

impl Read for ChannelFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

/// `(stdin, stdout, stderr)` as returned by `exec_command`.
pub type ExecStreams = (ChannelFile, ChannelFile, ChannelFile);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Unconnected,
    Connected,
    Closed,
}

/// Simulated SSH client.
#[derive(Debug)]
pub struct SshClient {
    registry: Registry,
    state: SessionState,
    selected_host: Option<String>,
    session_open: Arc<AtomicBool>,
    sftp: Option<SftpClient>,
    last_connect_options: Option<ConnectOptions>,
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SshClient {
    /// Client bound to the process-wide registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::global())
    }

    /// Client bound to an explicit registry.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            state: SessionState::Unconnected,
            selected_host: None,
            session_open: Arc::new(AtomicBool::new(false)),
            sftp: None,
            last_connect_options: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// `"host:port"` of the connected device.
    pub fn selected_host(&self) -> Option<&str> {
        self.selected_host.as_deref()
    }

    /// Options of the last successful `connect`.
    pub fn last_connect_options(&self) -> Option<&ConnectOptions> {
        self.last_connect_options.as_ref()
    }

    pub fn set_missing_host_key_policy(&mut self, policy: MissingHostKeyPolicy) {
        debug!("Ignoring missing host key policy {:?}", policy);
    }

    pub fn load_system_host_keys(&mut self, _filename: Option<&str>) {}

    pub fn load_host_keys(&mut self, _filename: &str) {}

    pub fn save_host_keys(&self, _filename: &str) {}

    pub fn set_log_channel(&mut self, _name: &str) {}

    /// Connects to `hostname:port`, authenticating with the given credentials.
    pub fn connect(
        &mut self,
        hostname: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        let mut options = ConnectOptions::new().with_port(port);
        options.username = username.map(str::to_string);
        options.password = password.map(str::to_string);
        self.connect_with(hostname, options)
    }

    /// Connects using a full set of [`ConnectOptions`].
    ///
    /// An injected failure wins over authentication: a device configured to
    /// fail never looks at the credentials.
    pub fn connect_with(&mut self, hostname: &str, options: ConnectOptions) -> Result<()> {
        self.reset_session();

        let key = device_key(hostname, options.port);
        debug!("Connecting to {}", key);

        let username = options.username.as_deref();
        let password = options.password.as_deref();
        self.registry.with_device(&key, |device| {
            if let Some(failure) = device.connection_failure() {
                warn!("Injected {} failure for {}", failure.kind(), key);
                return Err(failure.to_error(hostname, options.port));
            }
            if !device.authenticate(username, password) {
                warn!("Authentication failed for {:?} on {}", username, key);
                return Err(Error::AuthenticationFailed {
                    username: username.map(str::to_string),
                });
            }
            device.clear_history();
            Ok(())
        })??;

        info!("Connected to {}", key);
        self.state = SessionState::Connected;
        self.selected_host = Some(key);
        self.session_open = Arc::new(AtomicBool::new(true));
        self.last_connect_options = Some(options);
        Ok(())
    }

    fn selected(&self) -> Result<&str> {
        match (self.state, self.selected_host.as_deref()) {
            (SessionState::Connected, Some(key)) => Ok(key),
            _ => Err(Error::not_connected()),
        }
    }

    /// Executes `command` on the connected device.
    ///
    /// The command is recorded in the device history before it is resolved,
    /// so unresolved commands still show up there.
    pub fn exec_command(&mut self, command: &str) -> Result<ExecStreams> {
        let key = self.selected()?;
        let device = self.registry.with_device(key, |device| {
            device.add_command_to_history(command);
            device.clone()
        })?;
        debug!("exec on {}: {}", key, command);

        let CommandOutput {
            stdin,
            stdout,
            stderr,
            exit_status,
        } = device.responses().resolve(command)?.invoke(&device, command);

        let channel = Arc::new(Channel { exit_status });
        Ok((
            ChannelFile::new(stdin, Arc::clone(&channel)),
            ChannelFile::new(stdout, Arc::clone(&channel)),
            ChannelFile::new(stderr, channel),
        ))
    }

    /// Returns the session's SFTP client, creating it on first use.
    ///
    /// A client the caller already closed is replaced by a fresh one.
    pub fn open_sftp(&mut self) -> Result<SftpClient> {
        let key = self.selected()?.to_string();
        if let Some(sftp) = self.sftp.as_ref().filter(|sftp| !sftp.is_closed()) {
            return Ok(sftp.clone());
        }
        debug!("Opening SFTP session on {}", key);
        let sftp = SftpClient::new(
            self.registry.clone(),
            key,
            Arc::clone(&self.session_open),
        )?;
        self.sftp = Some(sftp.clone());
        Ok(sftp)
    }

    /// Interactive shells are not simulated.
    pub fn invoke_shell(&mut self) -> Result<()> {
        self.selected()?;
        Err(Error::Unsupported("interactive shell".to_string()))
    }

    /// Closes the session. Later calls fail until the next `connect`.
    pub fn close(&mut self) {
        if let Some(key) = &self.selected_host {
            debug!("Closing connection to {}", key);
        }
        self.reset_session();
        self.state = SessionState::Closed;
    }

    fn reset_session(&mut self) {
        self.session_open.store(false, Ordering::SeqCst);
        self.sftp = None;
        self.selected_host = None;
        self.state = SessionState::Unconnected;
    }
}

impl RemoteShell for SshClient {
    type Stream = ChannelFile;
    type Sftp = SftpClient;

    fn connect(
        &mut self,
        hostname: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        SshClient::connect(self, hostname, port, username, password)
    }

    fn exec_command(&mut self, command: &str) -> Result<ExecStreams> {
        SshClient::exec_command(self, command)
    }

    fn open_sftp(&mut self) -> Result<SftpClient> {
        SshClient::open_sftp(self)
    }

    fn close(&mut self) {
        SshClient::close(self)
    }
}
