//! YAML fixtures describing a set of virtual devices.
//!
//! A fixture lets a test suite keep its simulated hosts in a data file
//! instead of building them in code.
//!
//! # Example Fixture
//!
//! ```yaml
//! devices:
//!   - host: "build-01"
//!     port: 22
//!     username: "ci"
//!     password: "secret"
//!     responses:
//!       - command: "uname -m"
//!         stdout: "aarch64\n"
//!       - pattern: "systemctl status .*"
//!         stdout: "active (running)\n"
//!       - command: "false"
//!         exit_status: 1
//!     files:
//!       /etc/hostname: "build-01\n"
//!   - host: "offline-01"
//!     failure:
//!       kind: timeout
//! local_files:
//!   /home/ci/deploy.sh: "#!/bin/sh\n"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::remote::{
    CommandKey, Credentials, FailureConfig, Registry, ResponseTable, StaticResponse,
    DEFAULT_SSH_PORT,
};
use crate::vfs::FileRecord;

/// Top-level fixture document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FixtureConfig {
    /// Devices to register
    #[serde(default)]
    pub devices: Vec<DeviceFixture>,

    /// Files to place on the shared local filesystem
    #[serde(default)]
    pub local_files: BTreeMap<String, String>,
}

/// One virtual device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFixture {
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Username; requires `password`. Omit both for open access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Responses in resolution order
    #[serde(default)]
    pub responses: Vec<ResponseFixture>,

    /// Files on the device's remote filesystem
    #[serde(default)]
    pub files: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureFixture>,
}

/// A static response keyed by either an exact command or a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResponseFixture {
    /// Exact command. The `re(<pattern>)` form is also accepted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Start-anchored regular expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default)]
    pub stdin: String,

    #[serde(default)]
    pub stdout: String,

    #[serde(default)]
    pub stderr: String,

    #[serde(default)]
    pub exit_status: i32,
}

/// Serializable subset of [`FailureConfig`]; custom errors only exist in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureFixture {
    Dns {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hostname: Option<String>,
    },
    Timeout,
    Authentication,
    ConnectionRefused,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl FixtureConfig {
    /// Parses a fixture from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| {
            Error::Config(format!(
                "Failed to parse fixture: {}\n\n\
                 Suggestions:\n\
                 • Check YAML syntax and indentation (spaces, not tabs)\n\
                 • Every device needs a `host`\n\
                 • Failure kinds are: dns, timeout, authentication, connection_refused",
                e
            ))
        })
    }

    /// Loads a fixture file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read fixture file {}: {}", path.display(), e),
            ))
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("Failed to serialize fixture: {}", e)))
    }

    /// Writes the fixture to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    pub fn device(&self, host: &str, port: u16) -> Option<&DeviceFixture> {
        self.devices
            .iter()
            .find(|device| device.host == host && device.port == port)
    }

    /// Registers everything in the fixture.
    ///
    /// The whole fixture is validated before anything is registered, so a
    /// bad entry leaves the registry untouched.
    pub fn apply(&self, registry: &Registry) -> Result<()> {
        let mut prepared = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            prepared.push((
                device,
                device.response_table()?,
                device.credentials()?,
                device.failure_config(),
            ));
        }

        for (device, responses, credentials, failure) in prepared {
            registry.register_device(&device.host, device.port, responses, credentials, failure);
            for (path, content) in &device.files {
                registry.put_remote_file(
                    &device.host,
                    device.port,
                    path,
                    FileRecord::new(content.as_bytes()),
                )?;
            }
        }
        for (path, content) in &self.local_files {
            registry.put_local_file(path, FileRecord::new(content.as_bytes()));
        }
        Ok(())
    }
}

impl DeviceFixture {
    /// Creates an open-access device fixture on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: None,
            password: None,
            responses: Vec::new(),
            files: BTreeMap::new(),
            failure: None,
        }
    }

    fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn credentials(&self) -> Result<Option<Credentials>> {
        match (&self.username, &self.password) {
            (None, None) => Ok(None),
            (Some(username), Some(password)) => Ok(Some(Credentials::new(username, password))),
            _ => Err(Error::Config(format!(
                "Device {} sets only one of username/password",
                self.label()
            ))),
        }
    }

    fn response_table(&self) -> Result<ResponseTable> {
        let mut table = ResponseTable::new();
        for response in &self.responses {
            let key = match (&response.command, &response.pattern) {
                (Some(command), None) => CommandKey::parse(command)?,
                (None, Some(pattern)) => CommandKey::pattern(pattern)?,
                _ => {
                    return Err(Error::Config(format!(
                        "Response on {} needs exactly one of `command` or `pattern`",
                        self.label()
                    )))
                }
            };
            let body = StaticResponse::new(
                response.stdin.as_bytes(),
                response.stdout.as_bytes(),
                response.stderr.as_bytes(),
            )
            .with_exit_status(response.exit_status);
            table.insert(key, body);
        }
        Ok(table)
    }

    fn failure_config(&self) -> Option<FailureConfig> {
        self.failure.as_ref().map(|failure| match failure {
            FailureFixture::Dns { hostname } => {
                FailureConfig::dns(hostname.as_deref().unwrap_or(&self.host))
            }
            FailureFixture::Timeout => FailureConfig::Timeout,
            FailureFixture::Authentication => FailureConfig::Authentication,
            FailureFixture::ConnectionRefused => FailureConfig::ConnectionRefused,
        })
    }
}
