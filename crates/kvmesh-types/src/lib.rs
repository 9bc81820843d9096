use std::fmt;
use std::str::FromStr;

/// Version reported for a key that has never been written (or was deleted).
pub const ABSENT_VERSION: i64 = -1;

/// A cluster member. Identity is `name`; `address` is a `host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub address: String,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        NodeInfo {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}

/// Stored per key on the owning node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Vec<u8>,
    pub version: i64,
}

/// Outcome of an accepted Put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutAck {
    /// Version stored before this write, `ABSENT_VERSION` for a first write.
    pub previous_version: i64,
    /// Version the write was applied with.
    pub applied_version: i64,
}

/// Concurrency control applied by the owner on Put.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Accept only if the supplied version exceeds the stored one.
    #[default]
    Versioned,
    /// Always overwrite; the stored version becomes `previous + 1`.
    Unconditional,
}

/// Flat classification of a failed operation, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    VersionConflict,
    NotFound,
    TargetNotFound,
    ForwardFailed,
    NotOwner,
    InvalidArgument,
    Transport,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::VersionConflict => "version-conflict",
            ErrorKind::NotFound => "not-found",
            ErrorKind::TargetNotFound => "target-not-found",
            ErrorKind::ForwardFailed => "forward-failed",
            ErrorKind::NotOwner => "not-owner",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::Transport => "transport",
        }
    }
}

impl FromStr for ErrorKind {
    type Err = KvError;

    fn from_str(raw: &str) -> Result<Self, KvError> {
        Ok(match raw {
            "version-conflict" => ErrorKind::VersionConflict,
            "not-found" => ErrorKind::NotFound,
            "target-not-found" => ErrorKind::TargetNotFound,
            "forward-failed" => ErrorKind::ForwardFailed,
            "not-owner" => ErrorKind::NotOwner,
            "invalid-argument" => ErrorKind::InvalidArgument,
            "transport" => ErrorKind::Transport,
            _ => return Err(KvError::InvalidArgument(format!("unknown error kind '{raw}'"))),
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("version conflict; retry with version {next_version}")]
    VersionConflict { next_version: i64 },
    #[error("key '{key}' not found")]
    NotFound { key: String },
    #[error("target node '{node}' not found in registry")]
    TargetNotFound { node: String },
    #[error("forward to '{node}' failed: {reason}")]
    ForwardFailed { node: String, reason: String },
    #[error("node '{node}' does not own the key (owner: '{owner}')")]
    NotOwner { node: String, owner: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl KvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KvError::VersionConflict { .. } => ErrorKind::VersionConflict,
            KvError::NotFound { .. } => ErrorKind::NotFound,
            KvError::TargetNotFound { .. } => ErrorKind::TargetNotFound,
            KvError::ForwardFailed { .. } => ErrorKind::ForwardFailed,
            KvError::NotOwner { .. } => ErrorKind::NotOwner,
            KvError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            KvError::Transport(_) => ErrorKind::Transport,
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        KvError::NotFound { key: key.into() }
    }
}
