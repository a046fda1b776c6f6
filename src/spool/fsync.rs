//! Durability helpers for spool files.
//!
//! Creating, renaming or removing a spool entry changes the directory, not the
//! file. The directory has to be synced too, or a power loss can bring back a
//! claimed message under its pending name (or lose a freshly enqueued one).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a written payload file's contents and metadata.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entry creations, renames and removals persist.
///
/// # Errors
///
/// Fails if the directory cannot be opened or the sync call fails.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
