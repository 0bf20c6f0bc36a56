//! Registry of virtual devices and the shared local filesystem.
//!
//! A `Registry` is a cheap-clone handle over one mutex-guarded state. Tests
//! that want isolation build their own with [`Registry::new`]; code that
//! relies on implicit sharing uses [`Registry::global`], the single
//! process-wide instance. Either way, call [`Registry::cleanup`] between
//! scenarios so devices and files do not leak across tests.

use crate::config::FixtureConfig;
use crate::error::{Error, Result};
use crate::remote::device::{device_key, Credentials, VirtualDevice};
use crate::remote::failure::FailureConfig;
use crate::remote::response::{CommandKey, Response, ResponseTable};
use crate::remote::DEFAULT_SSH_PORT;
use crate::vfs::{FileRecord, VirtualFilesystem};
use log::{debug, info};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

#[derive(Debug, Default)]
struct RegistryState {
    devices: HashMap<String, VirtualDevice>,
    local_filesystem: VirtualFilesystem,
}

impl RegistryState {
    fn device(&self, key: &str) -> Result<&VirtualDevice> {
        self.devices.get(key).ok_or_else(|| Error::NotRegistered {
            key: key.to_string(),
        })
    }

    fn device_mut(&mut self, key: &str) -> Result<&mut VirtualDevice> {
        self.devices.get_mut(key).ok_or_else(|| Error::NotRegistered {
            key: key.to_string(),
        })
    }
}

/// Shared handle to the set of registered devices.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl Registry {
    /// Creates an empty, independent registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new).clone()
    }

    /// Returns true when both handles share the same state.
    pub fn same_as(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a device at `host:port`, replacing any previous one.
    pub fn register_device(
        &self,
        host: &str,
        port: u16,
        responses: ResponseTable,
        credentials: Option<Credentials>,
        failure: Option<FailureConfig>,
    ) {
        let mut state = self.lock();
        let device = VirtualDevice::new(host, port, responses, state.local_filesystem.clone())
            .with_credentials(credentials)
            .with_failure(failure);
        info!(
            "Registered device {} ({} responses)",
            device.key(),
            device.responses().len()
        );
        state.devices.insert(device.key(), device);
    }

    /// Returns a snapshot of the device at `host:port`.
    pub fn get_device(&self, host: &str, port: u16) -> Result<VirtualDevice> {
        self.lock().device(&device_key(host, port)).cloned()
    }

    pub fn has_device(&self, host: &str, port: u16) -> bool {
        self.lock().devices.contains_key(&device_key(host, port))
    }

    /// Keys of all registered devices, sorted.
    pub fn device_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().devices.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Forgets every device and empties the local filesystem.
    pub fn cleanup(&self) {
        let mut state = self.lock();
        info!(
            "Cleaning up registry ({} devices, {} local files)",
            state.devices.len(),
            state.local_filesystem.len()
        );
        state.devices.clear();
        state.local_filesystem.clear();
    }

    /// The shared local filesystem.
    pub fn local_filesystem(&self) -> VirtualFilesystem {
        self.lock().local_filesystem.clone()
    }

    /// Registers every device and local file a fixture describes.
    pub fn load_fixture(&self, fixture: &FixtureConfig) -> Result<()> {
        fixture.apply(self)
    }

    // Remote files

    pub fn put_remote_file(
        &self,
        host: &str,
        port: u16,
        path: &str,
        record: FileRecord,
    ) -> Result<()> {
        let state = self.lock();
        state.device(&device_key(host, port))?.filesystem().add_file(path, record);
        Ok(())
    }

    pub fn remove_remote_file(
        &self,
        host: &str,
        port: u16,
        path: &str,
    ) -> Result<Option<FileRecord>> {
        let state = self.lock();
        Ok(state.device(&device_key(host, port))?.filesystem().remove_file(path))
    }

    pub fn get_remote_file(
        &self,
        host: &str,
        port: u16,
        path: &str,
    ) -> Result<Option<FileRecord>> {
        let state = self.lock();
        Ok(state.device(&device_key(host, port))?.filesystem().get_file(path))
    }

    // Local files

    pub fn put_local_file(&self, path: &str, record: FileRecord) {
        self.lock().local_filesystem.add_file(path, record);
    }

    pub fn remove_local_file(&self, path: &str) -> Option<FileRecord> {
        self.lock().local_filesystem.remove_file(path)
    }

    pub fn get_local_file(&self, path: &str) -> Option<FileRecord> {
        self.lock().local_filesystem.get_file(path)
    }

    // Failure injection

    /// Makes `host:22` fail name resolution for `hostname` (defaults to `host`).
    pub fn setup_dns_failure(&self, host: &str, hostname: Option<&str>) {
        let failure = FailureConfig::dns(hostname.unwrap_or(host));
        self.inject_failure(host, DEFAULT_SSH_PORT, failure);
    }

    pub fn setup_timeout_failure(&self, host: &str) {
        self.inject_failure(host, DEFAULT_SSH_PORT, FailureConfig::Timeout);
    }

    pub fn setup_auth_failure(&self, host: &str) {
        self.inject_failure(host, DEFAULT_SSH_PORT, FailureConfig::Authentication);
    }

    pub fn setup_connection_refused(&self, host: &str) {
        self.inject_failure(host, DEFAULT_SSH_PORT, FailureConfig::ConnectionRefused);
    }

    pub fn setup_custom_failure<E>(&self, host: &str, port: u16, error: E)
    where
        E: StdError + Send + Sync + 'static,
    {
        self.inject_failure(host, port, FailureConfig::custom(error));
    }

    /// Sets `failure` on an existing device, or registers a bare device
    /// carrying it.
    pub fn inject_failure(&self, host: &str, port: u16, failure: FailureConfig) {
        let mut state = self.lock();
        let key = device_key(host, port);
        debug!("Injecting {} failure for {}", failure.kind(), key);
        match state.devices.get_mut(&key) {
            Some(device) => device.set_connection_failure(Some(failure)),
            None => {
                let device = VirtualDevice::new(
                    host,
                    port,
                    ResponseTable::new(),
                    state.local_filesystem.clone(),
                )
                .with_failure(Some(failure));
                state.devices.insert(key, device);
            }
        }
    }

    pub fn clear_connection_failure(&self, host: &str, port: u16) -> Result<()> {
        self.lock()
            .device_mut(&device_key(host, port))?
            .set_connection_failure(None);
        Ok(())
    }

    // Responses

    /// Runs `edit` against the response registered under `key`.
    ///
    /// The closure edits a copy outside the registry lock, so it may call
    /// back into the registry. The copy is stored back afterwards; if the
    /// device or the entry disappeared meanwhile the edit is dropped and an
    /// error returned.
    ///
    /// ```rust,no_run
    /// # use sshmock::remote::{Registry, CommandKey};
    /// # let registry = Registry::new();
    /// registry.edit_response("box", 22, &CommandKey::literal("ls"), |response| {
    ///     if let Some(response) = response.as_static_mut() {
    ///         response.append_to_stdout("\nnew.txt");
    ///     }
    /// })?;
    /// # Ok::<(), sshmock::Error>(())
    /// ```
    pub fn edit_response<R>(
        &self,
        host: &str,
        port: u16,
        key: &CommandKey,
        edit: impl FnOnce(&mut Response) -> R,
    ) -> Result<R> {
        let device = device_key(host, port);
        let not_found = || Error::ResponseNotFound {
            host: device.clone(),
            key: key.to_string(),
        };

        let mut response = self
            .lock()
            .device(&device)?
            .responses()
            .get(key)
            .cloned()
            .ok_or_else(not_found)?;
        let result = edit(&mut response);

        let mut state = self.lock();
        let slot = state
            .device_mut(&device)?
            .responses_mut()
            .get_mut(key)
            .ok_or_else(not_found)?;
        *slot = response;
        Ok(result)
    }

    /// Adds or replaces a single response on an existing device.
    pub fn add_response(
        &self,
        host: &str,
        port: u16,
        key: impl Into<CommandKey>,
        response: impl Into<Response>,
    ) -> Result<()> {
        self.lock()
            .device_mut(&device_key(host, port))?
            .responses_mut()
            .insert(key, response);
        Ok(())
    }

    // Session plumbing for the client

    pub(crate) fn with_device<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut VirtualDevice) -> R,
    ) -> Result<R> {
        Ok(f(self.lock().device_mut(key)?))
    }

    // History

    pub fn command_history(&self, host: &str, port: u16) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .device(&device_key(host, port))?
            .command_history()
            .to_vec())
    }

    #[track_caller]
    fn history_or_panic(&self, host: &str, port: u16) -> Vec<String> {
        match self.command_history(host, port) {
            Ok(history) => history,
            Err(e) => panic!("{}", e),
        }
    }

    /// Panics unless `command` was executed on `host:port`.
    #[track_caller]
    pub fn assert_command_was_executed(&self, host: &str, port: u16, command: &str) {
        let history = self.history_or_panic(host, port);
        assert!(
            history.iter().any(|c| c == command),
            "expected '{}' to have been executed on {}:{}, history: {:?}",
            command,
            host,
            port,
            history
        );
    }

    /// Panics if `command` was executed on `host:port`.
    #[track_caller]
    pub fn assert_command_was_not_executed(&self, host: &str, port: u16, command: &str) {
        let history = self.history_or_panic(host, port);
        assert!(
            !history.iter().any(|c| c == command),
            "expected '{}' not to have been executed on {}:{}, history: {:?}",
            command,
            host,
            port,
            history
        );
    }

    /// Panics unless the `index`-th command executed on `host:port` is `command`.
    #[track_caller]
    pub fn assert_command_executed_on_index(
        &self,
        host: &str,
        port: u16,
        command: &str,
        index: usize,
    ) {
        let history = self.history_or_panic(host, port);
        assert_eq!(
            history.get(index).map(String::as_str),
            Some(command),
            "unexpected command at index {} on {}:{}, history: {:?}",
            index,
            host,
            port,
            history
        );
    }
}

#[cfg(test)]
mod tests;
