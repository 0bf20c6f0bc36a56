//! A simulated remote endpoint.

use crate::remote::failure::FailureConfig;
use crate::remote::response::ResponseTable;
use crate::vfs::VirtualFilesystem;

/// Username/password pair a device accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Virtual remote device registered under `"host:port"`.
///
/// Devices live inside a [`Registry`](crate::remote::Registry). Response
/// callbacks receive a snapshot of the device whose filesystem handles are
/// still live, so a callback can create or inspect files.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    pub host: String,
    pub port: u16,
    credentials: Option<Credentials>,
    responses: ResponseTable,
    connection_failure: Option<FailureConfig>,
    history: Vec<String>,
    filesystem: VirtualFilesystem,
    local_filesystem: VirtualFilesystem,
}

impl VirtualDevice {
    /// Creates an open-access device with an empty remote filesystem.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        responses: ResponseTable,
        local_filesystem: VirtualFilesystem,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            responses,
            connection_failure: None,
            history: Vec::new(),
            filesystem: VirtualFilesystem::new(),
            local_filesystem,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_failure(mut self, failure: Option<FailureConfig>) -> Self {
        self.connection_failure = failure;
        self
    }

    /// Registry key for this device.
    pub fn key(&self) -> String {
        device_key(&self.host, self.port)
    }

    /// Open access when no credentials are configured, otherwise an exact
    /// match on both username and password.
    pub fn authenticate(&self, username: Option<&str>, password: Option<&str>) -> bool {
        match &self.credentials {
            None => true,
            Some(expected) => {
                username == Some(expected.username.as_str())
                    && password == Some(expected.password.as_str())
            }
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn responses(&self) -> &ResponseTable {
        &self.responses
    }

    pub(crate) fn responses_mut(&mut self) -> &mut ResponseTable {
        &mut self.responses
    }

    pub fn connection_failure(&self) -> Option<&FailureConfig> {
        self.connection_failure.as_ref()
    }

    pub(crate) fn set_connection_failure(&mut self, failure: Option<FailureConfig>) {
        self.connection_failure = failure;
    }

    /// Commands executed since the last successful connect, oldest first.
    pub fn command_history(&self) -> &[String] {
        &self.history
    }

    pub(crate) fn add_command_to_history(&mut self, command: &str) {
        self.history.push(command.to_string());
    }

    pub(crate) fn clear_history(&mut self) {
        self.history.clear();
    }

    /// This device's remote filesystem.
    pub fn filesystem(&self) -> &VirtualFilesystem {
        &self.filesystem
    }

    /// The registry-wide local filesystem.
    pub fn local_filesystem(&self) -> &VirtualFilesystem {
        &self.local_filesystem
    }
}

pub(crate) fn device_key(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> VirtualDevice {
        VirtualDevice::new("h1", 2222, ResponseTable::new(), VirtualFilesystem::new())
    }

    #[test]
    fn test_key() {
        assert_eq!(device().key(), "h1:2222");
    }

    #[test]
    fn test_open_access_accepts_anything() {
        let device = device();
        assert!(device.authenticate(None, None));
        assert!(device.authenticate(Some("root"), Some("whatever")));
        assert!(device.authenticate(Some("root"), None));
    }

    #[test]
    fn test_credentials_require_exact_match() {
        let device = device().with_credentials(Some(Credentials::new("u", "p")));
        assert!(device.authenticate(Some("u"), Some("p")));
        assert!(!device.authenticate(Some("u"), Some("P")));
        assert!(!device.authenticate(Some("u"), None));
        assert!(!device.authenticate(None, None));
    }

    #[test]
    fn test_history_append_and_clear() {
        let mut device = device();
        device.add_command_to_history("ls");
        device.add_command_to_history("pwd");
        assert_eq!(device.command_history(), ["ls", "pwd"]);

        device.clear_history();
        assert!(device.command_history().is_empty());
    }

    #[test]
    fn test_remote_filesystem_is_private_local_is_shared() {
        let local = VirtualFilesystem::new();
        let a = VirtualDevice::new("h", 22, ResponseTable::new(), local.clone());
        let b = VirtualDevice::new("h", 2222, ResponseTable::new(), local.clone());

        assert!(!a.filesystem().same_as(b.filesystem()));
        assert!(a.local_filesystem().same_as(b.local_filesystem()));
    }
}
