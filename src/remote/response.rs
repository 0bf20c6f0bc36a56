//! Command responses and the resolver that picks one for a command.
//!
//! A device owns a [`ResponseTable`]: an ordered list of
//! `(CommandKey, Response)` entries. Resolution tries an exact literal match
//! first, then walks the pattern entries in insertion order and takes the
//! first whose regex matches at the start of the command.

use crate::error::{Error, Result};
use crate::remote::device::VirtualDevice;
use log::debug;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Streams and exit status produced by one command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdin: Vec<u8>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: i32,
}

impl CommandOutput {
    /// Output with only stdout set.
    pub fn stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Output with only stderr and a failing exit status set.
    pub fn failure(stderr: impl Into<Vec<u8>>, exit_status: i32) -> Self {
        Self {
            stderr: stderr.into(),
            exit_status,
            ..Self::default()
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_exit_status(mut self, exit_status: i32) -> Self {
        self.exit_status = exit_status;
        self
    }
}

/// Fixed streams returned every time the command runs.
///
/// The stdout buffer can be edited after registration (through
/// `Registry::edit_response`) so a test can evolve what a command reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticResponse {
    pub stdin: Vec<u8>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: i32,
}

impl StaticResponse {
    pub fn new(
        stdin: impl Into<Vec<u8>>,
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            stdin: stdin.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status: 0,
        }
    }

    /// Response that only writes `stdout`.
    pub fn stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self::new(Vec::new(), stdout, Vec::new())
    }

    pub fn with_exit_status(mut self, exit_status: i32) -> Self {
        self.exit_status = exit_status;
        self
    }

    pub fn append_to_stdout(&mut self, text: &str) {
        self.stdout.extend_from_slice(text.as_bytes());
    }

    /// Drops every stdout line that contains `needle`.
    pub fn remove_line_containing(&mut self, needle: &str) {
        let stdout = String::from_utf8_lossy(&self.stdout).into_owned();
        self.stdout = stdout
            .split('\n')
            .filter(|line| !line.contains(needle))
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes();
    }

    fn output(&self) -> CommandOutput {
        CommandOutput {
            stdin: self.stdin.clone(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            exit_status: self.exit_status,
        }
    }
}

type Handler = dyn Fn(&VirtualDevice, &str) -> CommandOutput + Send + Sync;

/// Response computed on every execution from the device and command text.
#[derive(Clone)]
pub struct CallbackResponse {
    handler: Arc<Handler>,
}

impl CallbackResponse {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&VirtualDevice, &str) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    fn call(&self, device: &VirtualDevice, command: &str) -> CommandOutput {
        (self.handler)(device, command)
    }
}

impl fmt::Debug for CallbackResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackResponse(..)")
    }
}

/// What a device answers for a command.
#[derive(Debug, Clone)]
pub enum Response {
    Static(StaticResponse),
    Callback(CallbackResponse),
}

impl Response {
    /// Static response with the three streams given as text.
    pub fn text(stdin: &str, stdout: &str, stderr: &str) -> Self {
        Self::Static(StaticResponse::new(stdin, stdout, stderr))
    }

    pub fn callback<F>(handler: F) -> Self
    where
        F: Fn(&VirtualDevice, &str) -> CommandOutput + Send + Sync + 'static,
    {
        Self::Callback(CallbackResponse::new(handler))
    }

    pub fn as_static(&self) -> Option<&StaticResponse> {
        match self {
            Self::Static(response) => Some(response),
            Self::Callback(_) => None,
        }
    }

    pub fn as_static_mut(&mut self) -> Option<&mut StaticResponse> {
        match self {
            Self::Static(response) => Some(response),
            Self::Callback(_) => None,
        }
    }

    /// Produces the output for `command` as executed on `device`.
    pub fn invoke(&self, device: &VirtualDevice, command: &str) -> CommandOutput {
        match self {
            Self::Static(response) => response.output(),
            Self::Callback(response) => response.call(device, command),
        }
    }
}

impl From<StaticResponse> for Response {
    fn from(response: StaticResponse) -> Self {
        Self::Static(response)
    }
}

impl From<CallbackResponse> for Response {
    fn from(response: CallbackResponse) -> Self {
        Self::Callback(response)
    }
}

/// A compiled, start-anchored command pattern.
#[derive(Debug, Clone)]
pub struct CommandPattern {
    source: String,
    regex: Regex,
}

impl CommandPattern {
    pub fn new(source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})", source)).map_err(|e| Error::InvalidPattern {
            pattern: source.to_string(),
            source: e,
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern matches a prefix of `command`.
    pub fn matches(&self, command: &str) -> bool {
        self.regex.is_match(command)
    }
}

/// Key of a response table entry.
#[derive(Debug, Clone)]
pub enum CommandKey {
    Literal(String),
    Pattern(CommandPattern),
}

impl CommandKey {
    pub fn literal(command: impl Into<String>) -> Self {
        Self::Literal(command.into())
    }

    pub fn pattern(source: &str) -> Result<Self> {
        CommandPattern::new(source).map(Self::Pattern)
    }

    /// Parses the textual form used in fixtures: `re(<pattern>)` is a
    /// pattern key, anything else a literal command.
    pub fn parse(key: &str) -> Result<Self> {
        match key.strip_prefix("re(").and_then(|rest| rest.strip_suffix(')')) {
            Some(source) => Self::pattern(source),
            None => Ok(Self::literal(key)),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern(_))
    }
}

impl PartialEq for CommandKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.source == b.source,
            _ => false,
        }
    }
}

impl Eq for CommandKey {}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(command) => f.write_str(command),
            Self::Pattern(pattern) => write!(f, "re({})", pattern.source),
        }
    }
}

impl From<&str> for CommandKey {
    fn from(command: &str) -> Self {
        Self::literal(command)
    }
}

impl From<String> for CommandKey {
    fn from(command: String) -> Self {
        Self::Literal(command)
    }
}

/// Insertion-ordered command → response mapping.
#[derive(Debug, Clone, Default)]
pub struct ResponseTable {
    entries: Vec<(CommandKey, Response)>,
}

impl ResponseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. Re-inserting an existing key replaces its response
    /// and keeps its original position.
    pub fn insert(&mut self, key: impl Into<CommandKey>, response: impl Into<Response>) {
        let key = key.into();
        let response = response.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = response,
            None => self.entries.push((key, response)),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<CommandKey>, response: impl Into<Response>) -> Self {
        self.insert(key, response);
        self
    }

    /// Builder that adds a pattern entry.
    pub fn with_pattern(mut self, source: &str, response: impl Into<Response>) -> Result<Self> {
        self.insert(CommandKey::pattern(source)?, response);
        Ok(self)
    }

    pub fn get(&self, key: &CommandKey) -> Option<&Response> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, response)| response)
    }

    pub fn get_mut(&mut self, key: &CommandKey) -> Option<&mut Response> {
        self.entries
            .iter_mut()
            .find(|(existing, _)| existing == key)
            .map(|(_, response)| response)
    }

    pub fn remove(&mut self, key: &CommandKey) -> Option<Response> {
        let index = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CommandKey, &Response)> {
        self.entries.iter().map(|(key, response)| (key, response))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Picks the response for `command`: exact literal first, then the
    /// first pattern (in insertion order) matching a prefix of it.
    pub fn resolve(&self, command: &str) -> Result<&Response> {
        let exact = self.entries.iter().find(|(key, _)| match key {
            CommandKey::Literal(literal) => literal == command,
            CommandKey::Pattern(_) => false,
        });
        if let Some((_, response)) = exact {
            debug!("Resolved '{}' by exact match", command);
            return Ok(response);
        }

        for (key, response) in &self.entries {
            if let CommandKey::Pattern(pattern) = key {
                if pattern.matches(command) {
                    debug!("Resolved '{}' by pattern re({})", command, pattern.as_str());
                    return Ok(response);
                }
            }
        }

        Err(Error::UnresolvedCommand {
            command: command.to_string(),
        })
    }
}

impl<K, R> FromIterator<(K, R)> for ResponseTable
where
    K: Into<CommandKey>,
    R: Into<Response>,
{
    fn from_iter<I: IntoIterator<Item = (K, R)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (key, response) in iter {
            table.insert(key, response);
        }
        table
    }
}
