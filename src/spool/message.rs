//! Spooled message handles and spool errors.
//!
//! A message moves through two on-disk names:
//!
//! ```text
//! <id>.message             - pending (payload, waiting for a retry run)
//! <id>.message.processing  - claimed (payload, owned by exactly one run)
//! ```
//!
//! Writes go through `<id>.message.tmp`, which never matches the pending
//! pattern, so a half-written payload is never picked up.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::MessageId;

/// Extension of a pending message file.
pub const MESSAGE_EXTENSION: &str = "message";

/// Suffix appended to a pending file name when a run claims it.
pub const PROCESSING_SUFFIX: &str = ".processing";

/// Suffix of the temp file used while enqueueing.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Errors that can occur during spool operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Another caller claimed the message first, or it vanished.
    #[error("message already claimed: {0}")]
    AlreadyClaimed(MessageId),

    /// The payload could not be decoded into a message.
    #[error("corrupt payload in message {id}: {reason}")]
    CorruptPayload { id: MessageId, reason: String },

    /// A pending or claimed message with this id already exists.
    #[error("duplicate message ID: {0}")]
    DuplicateMessage(MessageId),

    /// The id cannot be used as a file name.
    #[error("invalid message ID: contains unsafe characters: {0}")]
    InvalidMessageId(MessageId),
}

/// Result type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

/// Rejects ids that would escape the spool directory or collide with its
/// naming scheme.
///
/// Dot-prefixed ids are allowed: enumeration includes hidden files.
pub(crate) fn validate_message_id(id: &MessageId) -> Result<()> {
    let s = id.as_str();

    if s.is_empty() || s == "." || s == ".." {
        return Err(SpoolError::InvalidMessageId(id.clone()));
    }

    if s.contains('/') || s.contains('\\') || s.contains('\0') {
        return Err(SpoolError::InvalidMessageId(id.clone()));
    }

    Ok(())
}

/// Extracts the id from a `<id>.message` file name.
pub(crate) fn id_from_pending_name(file_name: &str) -> Option<MessageId> {
    let stem = file_name.strip_suffix(MESSAGE_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(MessageId::new(stem))
}

/// Appends `suffix` to the file name of `path`.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// A pending message file, as found by enumeration.
///
/// Holding a handle grants nothing: the file may be claimed by another run at
/// any moment. Use [`SpoolStore::claim`](super::SpoolStore::claim) to take
/// ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpooledMessage {
    pub id: MessageId,

    /// Path to `<id>.message`.
    pub path: PathBuf,
}

impl SpooledMessage {
    /// Creates a handle for `<dir>/<id>.message`.
    pub fn new(dir: &Path, id: MessageId) -> Self {
        let path = dir.join(format!("{}.{}", id.as_str(), MESSAGE_EXTENSION));
        SpooledMessage { id, path }
    }

    /// Path the file is renamed to when claimed.
    pub fn processing_path(&self) -> PathBuf {
        with_suffix(&self.path, PROCESSING_SUFFIX)
    }

    /// Path used while the payload is being written.
    pub fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, TEMP_SUFFIX)
    }

    /// Directory holding the file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn is_pending(&self) -> bool {
        self.path.exists()
    }

    pub fn is_claimed(&self) -> bool {
        self.processing_path().exists()
    }
}

/// A message exclusively owned by one run, renamed to `<id>.message.processing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedMessage {
    pub id: MessageId,

    /// Path to `<id>.message.processing`.
    pub path: PathBuf,

    /// Path the message returns to if released.
    pub pending_path: PathBuf,
}

impl ClaimedMessage {
    pub(crate) fn from_pending(pending: &SpooledMessage) -> Self {
        ClaimedMessage {
            id: pending.id.clone(),
            path: pending.processing_path(),
            pending_path: pending.path.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}
