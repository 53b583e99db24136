//! Wire types exchanged with the daemon.
//!
//! Field names follow the daemon's camelCase JSON. Numeric and boolean scalars
//! travel as strings and are parsed into native types.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod exit_status;
mod stringified;

pub use exit_status::ExitStatus;

/// Download identifier assigned by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(String);

impl Gid {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Gid {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for Gid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Gid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state reported by `tellStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusName {
    /// Currently downloading or seeding.
    Active,
    /// Queued, not started.
    Waiting,
    /// Paused.
    Paused,
    /// Stopped because of an error.
    Error,
    /// Stopped and completed.
    #[serde(rename = "complete", alias = "completed")]
    Complete,
    /// Removed by the user.
    Removed,
}

/// Download status record. Every field is optional on the wire so that
/// projected `tellStatus` replies decode into the same type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Status {
    /// Download identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<Gid>,
    /// Lifecycle state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusName>,
    /// Total length in bytes.
    #[serde(with = "stringified")]
    pub total_length: u64,
    /// Completed length in bytes.
    #[serde(with = "stringified")]
    pub completed_length: u64,
    /// Uploaded length in bytes.
    #[serde(with = "stringified")]
    pub upload_length: u64,
    /// Hex-encoded piece bitfield.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub bitfield: String,
    /// Download speed in bytes per second.
    #[serde(with = "stringified")]
    pub download_speed: u64,
    /// Upload speed in bytes per second.
    #[serde(with = "stringified")]
    pub upload_speed: u64,
    /// BitTorrent info hash.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub info_hash: String,
    /// Number of seeders connected.
    #[serde(with = "stringified")]
    pub num_seeders: u64,
    /// Whether the local endpoint is a seeder.
    #[serde(with = "stringified")]
    pub seeder: bool,
    /// Piece length in bytes.
    #[serde(with = "stringified")]
    pub piece_length: u64,
    /// Number of pieces.
    #[serde(with = "stringified")]
    pub num_pieces: u64,
    /// Number of peers or servers connected.
    #[serde(with = "stringified")]
    pub connections: u64,
    /// Last error code for this download.
    #[serde(with = "stringified")]
    pub error_code: ExitStatus,
    /// Last error message for this download.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    /// Downloads spawned by this one, such as the payload of a metalink.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub followed_by: Vec<Gid>,
    /// Reverse link of `followed_by`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<Gid>,
    /// Parent download.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub belongs_to: Option<Gid>,
    /// Directory files are saved in.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dir: String,
    /// Files of this download.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,
    /// BitTorrent metadata, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bittorrent: Option<Value>,
    /// Bytes verified during a hash check.
    #[serde(with = "stringified")]
    pub verified_length: u64,
    /// Whether a hash check is queued.
    #[serde(with = "stringified")]
    pub verify_integrity_pending: bool,
}

/// One file of a download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct File {
    /// 1-based file index.
    #[serde(with = "stringified")]
    pub index: u32,
    /// Local path of the file.
    pub path: PathBuf,
    /// File length in bytes.
    #[serde(with = "stringified")]
    pub length: u64,
    /// Completed length in bytes.
    #[serde(with = "stringified")]
    pub completed_length: u64,
    /// Whether the file is selected for download.
    #[serde(with = "stringified")]
    pub selected: bool,
    /// Sources for this file.
    pub uris: Vec<Uri>,
}

/// Whether a source URI is currently in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UriStatus {
    /// In use.
    Used,
    /// Queued.
    Waiting,
}

/// One source of a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uri {
    /// Source location.
    pub uri: String,
    /// Usage state.
    pub status: UriStatus,
}

/// Anchor for `changePosition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionAnchor {
    /// Relative to the start of the queue.
    #[serde(rename = "POS_SET")]
    Start,
    /// Relative to the download's current position.
    #[serde(rename = "POS_CUR")]
    Current,
    /// Relative to the end of the queue.
    #[serde(rename = "POS_END")]
    End,
}

/// Per-download options passed to `addUri`, keyed by daemon option name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadOptions(BTreeMap<String, String>);

impl DownloadOptions {
    /// Empty option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, replacing an earlier value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Directory to store the download in.
    #[must_use]
    pub fn with_dir(self, dir: impl Into<String>) -> Self {
        self.with("dir", dir)
    }

    /// File name of the downloaded file, relative to `dir`.
    #[must_use]
    pub fn with_out(self, out: impl Into<String>) -> Self {
        self.with("out", out)
    }

    /// Look up an option.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Whether no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Payload of every download notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEvent {
    /// Download the event refers to.
    pub gid: Gid,
}
