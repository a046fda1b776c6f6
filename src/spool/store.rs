//! The on-disk spool store.
//!
//! All mutation goes through renames inside the spool directory, so the only
//! cross-process coordination needed is the atomicity of `rename(2)` on a
//! single filesystem.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::fsync::{fsync_dir, fsync_file};
use super::message::{
    ClaimedMessage, PROCESSING_SUFFIX, Result, SpoolError, SpooledMessage, id_from_pending_name,
    validate_message_id,
};
use crate::types::MessageId;

/// Name of the reserved spool directory under the cache root.
pub const SPOOL_DIR_NAME: &str = ".spool";

/// A directory of message files awaiting redelivery.
#[derive(Debug, Clone)]
pub struct SpoolStore {
    dir: PathBuf,
}

impl SpoolStore {
    /// Creates a store rooted at `<cache_root>/.spool`.
    ///
    /// The directory is not created until something is enqueued.
    pub fn new(cache_root: impl AsRef<Path>) -> Self {
        SpoolStore {
            dir: cache_root.as_ref().join(SPOOL_DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the spool directory exists.
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Writes a new pending message under a generated id.
    pub fn enqueue(&self, payload: &[u8]) -> Result<SpooledMessage> {
        self.enqueue_with_id(&MessageId::generate(), payload)
    }

    /// Writes a new pending message atomically.
    ///
    /// The payload is written to `<id>.message.tmp`, synced, renamed to
    /// `<id>.message`, and the directory synced.
    ///
    /// # Errors
    ///
    /// Returns `SpoolError::InvalidMessageId` for ids that are not safe file
    /// names, and `SpoolError::DuplicateMessage` if a pending or claimed file
    /// with the same id exists.
    pub fn enqueue_with_id(&self, id: &MessageId, payload: &[u8]) -> Result<SpooledMessage> {
        validate_message_id(id)?;
        fs::create_dir_all(&self.dir)?;

        let message = SpooledMessage::new(&self.dir, id.clone());
        if message.is_pending() || message.is_claimed() {
            return Err(SpoolError::DuplicateMessage(id.clone()));
        }

        let temp_path = message.temp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(payload)?;
            fsync_file(&file)?;
        }

        fs::rename(&temp_path, &message.path)?;
        sync_after_change(&self.dir, id, "enqueue");

        debug!(id = %id, bytes = payload.len(), "enqueued message");
        Ok(message)
    }

    /// Lists every pending `*.message` file under the spool directory,
    /// recursively and including dot-files, in lexicographic path order.
    ///
    /// The returned iterator is one-shot; call again to re-scan. Entries may
    /// be claimed by someone else between listing and claiming.
    ///
    /// A missing spool directory lists as empty.
    pub fn list_pending(&self) -> Result<PendingMessages> {
        let mut paths = Vec::new();
        if self.exists() {
            collect_files(&self.dir, &mut paths, &|name: &str| {
                id_from_pending_name(name).is_some()
            })?;
        }
        paths.sort();
        Ok(PendingMessages {
            paths: paths.into_iter(),
        })
    }

    /// Lists claimed `*.message.processing` files, in lexicographic path order.
    pub fn list_processing(&self) -> Result<Vec<ClaimedMessage>> {
        let mut paths = Vec::new();
        if self.exists() {
            collect_files(&self.dir, &mut paths, &|name: &str| {
                name.strip_suffix(PROCESSING_SUFFIX)
                    .and_then(id_from_pending_name)
                    .is_some()
            })?;
        }
        paths.sort();
        Ok(paths.iter().filter_map(|p| claimed_from_path(p)).collect())
    }

    /// Returns the number of pending messages.
    pub fn count_pending(&self) -> Result<usize> {
        Ok(self.list_pending()?.count())
    }

    /// Returns the number of claimed messages.
    pub fn count_processing(&self) -> Result<usize> {
        Ok(self.list_processing()?.len())
    }

    /// Claims a pending message by renaming it to `<id>.message.processing`.
    ///
    /// Exactly one of several concurrent claimers of the same file succeeds:
    /// once the first rename lands, the source no longer exists. Once it has
    /// landed the claim is returned, even if syncing the directory fails.
    ///
    /// # Errors
    ///
    /// Returns `SpoolError::AlreadyClaimed` if the claimed name already
    /// exists or the pending file is gone, and `SpoolError::Io` otherwise.
    pub fn claim(&self, message: &SpooledMessage) -> Result<ClaimedMessage> {
        let claimed = ClaimedMessage::from_pending(message);

        if claimed.path.exists() {
            return Err(SpoolError::AlreadyClaimed(message.id.clone()));
        }

        match fs::rename(&message.path, &claimed.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SpoolError::AlreadyClaimed(message.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        sync_after_change(claimed.dir(), &claimed.id, "claim");
        Ok(claimed)
    }

    /// Reads the raw payload of a claimed message.
    pub fn read(&self, claimed: &ClaimedMessage) -> Result<Vec<u8>> {
        Ok(fs::read(&claimed.path)?)
    }

    /// Removes a claimed message. Removing an already-removed file is a no-op.
    pub fn delete(&self, claimed: &ClaimedMessage) -> Result<()> {
        match fs::remove_file(&claimed.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        sync_after_change(claimed.dir(), &claimed.id, "delete");
        Ok(())
    }

    /// Hands a claimed message back to the pending set.
    ///
    /// # Errors
    ///
    /// Returns `SpoolError::DuplicateMessage` if a pending file with the same
    /// id reappeared in the meantime.
    pub fn release(&self, claimed: &ClaimedMessage) -> Result<SpooledMessage> {
        if claimed.pending_path.exists() {
            return Err(SpoolError::DuplicateMessage(claimed.id.clone()));
        }
        fs::rename(&claimed.path, &claimed.pending_path)?;
        sync_after_change(claimed.dir(), &claimed.id, "release");
        Ok(SpooledMessage {
            id: claimed.id.clone(),
            path: claimed.pending_path.clone(),
        })
    }

    /// Returns claimed messages whose claim is older than `older_than` to the
    /// pending set, and reports how many were recovered.
    ///
    /// A claim older than any plausible delivery means the claiming process
    /// died. This must not be run with a threshold shorter than the longest
    /// delivery, or a live run's message gets delivered twice.
    pub fn recover_stale(&self, older_than: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut recovered = 0;

        for claimed in self.list_processing()? {
            let Ok(modified) = fs::metadata(&claimed.path).and_then(|m| m.modified()) else {
                continue;
            };
            if modified > cutoff {
                continue;
            }
            match self.release(&claimed) {
                Ok(_) => recovered += 1,
                Err(e) => warn!(id = %claimed.id, error = %e, "could not recover stale claim"),
            }
        }

        Ok(recovered)
    }
}

/// Syncs `dir` once a rename or removal in it has already happened.
///
/// The change is visible to every other process from then on, so a failed
/// sync is logged rather than reported as if the change had not happened.
/// Returns whether the sync succeeded.
fn sync_after_change(dir: &Path, id: &MessageId, op: &'static str) -> bool {
    match fsync_dir(dir) {
        Ok(()) => true,
        Err(e) => {
            warn!(%id, op, error = %e, "directory sync failed after the change landed");
            false
        }
    }
}

/// One-shot iterator over pending messages found by a single scan.
#[derive(Debug)]
pub struct PendingMessages {
    paths: std::vec::IntoIter<PathBuf>,
}

impl Iterator for PendingMessages {
    type Item = SpooledMessage;

    fn next(&mut self) -> Option<SpooledMessage> {
        for path in self.paths.by_ref() {
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(id_from_pending_name)
            else {
                continue;
            };
            return Some(SpooledMessage { id, path });
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.paths.len()))
    }
}

fn claimed_from_path(path: &Path) -> Option<ClaimedMessage> {
    let name = path.file_name()?.to_str()?;
    let pending_name = name.strip_suffix(PROCESSING_SUFFIX)?;
    let id = id_from_pending_name(pending_name)?;
    Some(ClaimedMessage {
        id,
        path: path.to_path_buf(),
        pending_path: path.with_file_name(pending_name),
    })
}

/// Recursively collects regular files under `dir` whose names pass `keep`.
///
/// Subdirectories that vanish mid-scan are skipped.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>, keep: &dyn Fn(&str) -> bool) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();

        if file_type.is_dir() {
            collect_files(&path, out, keep)?;
        } else if file_type.is_file()
            && let Some(name) = path.file_name().and_then(|n| n.to_str())
            && keep(name)
        {
            out.push(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Barrier;
    use tempfile::tempdir;

    fn arb_message_id() -> impl Strategy<Value = MessageId> {
        "[0-9a-f]{16}".prop_map(MessageId::new)
    }

    fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..256)
    }

    proptest! {
        /// Every enqueued message is listed exactly once, in sorted order.
        #[test]
        fn list_pending_returns_every_enqueued_message_sorted(
            ids in prop::collection::hash_set(arb_message_id(), 1..10),
            payload in arb_payload(),
        ) {
            let dir = tempdir().unwrap();
            let store = SpoolStore::new(dir.path());
            for id in &ids {
                store.enqueue_with_id(id, &payload).unwrap();
            }

            let listed: Vec<_> = store.list_pending().unwrap().map(|m| m.id).collect();
            let mut expected: Vec<_> = ids.into_iter().collect();
            expected.sort();
            prop_assert_eq!(listed, expected);
        }

        /// Claimed messages never show up as pending.
        #[test]
        fn claimed_messages_are_not_listed(
            pending in prop::collection::hash_set(arb_message_id(), 1..5),
            claimed in prop::collection::hash_set(arb_message_id(), 1..5),
        ) {
            prop_assume!(pending.is_disjoint(&claimed));
            let dir = tempdir().unwrap();
            let store = SpoolStore::new(dir.path());

            for id in &pending {
                store.enqueue_with_id(id, b"p").unwrap();
            }
            for id in &claimed {
                let msg = store.enqueue_with_id(id, b"c").unwrap();
                store.claim(&msg).unwrap();
            }

            let listed: HashSet<_> = store.list_pending().unwrap().map(|m| m.id).collect();
            prop_assert_eq!(listed, pending);
            prop_assert_eq!(store.count_processing().unwrap(), claimed.len());
        }

        /// Payload bytes survive enqueue, claim and read unchanged.
        #[test]
        fn claimed_payload_matches_enqueued(id in arb_message_id(), payload in arb_payload()) {
            let dir = tempdir().unwrap();
            let store = SpoolStore::new(dir.path());
            let msg = store.enqueue_with_id(&id, &payload).unwrap();
            let claimed = store.claim(&msg).unwrap();
            prop_assert_eq!(store.read(&claimed).unwrap(), payload);
        }
    }

    #[test]
    fn missing_directory_lists_empty_and_creates_nothing() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());

        assert!(!store.exists());
        assert_eq!(store.list_pending().unwrap().count(), 0);
        assert_eq!(store.count_processing().unwrap(), 0);
        assert!(!dir.path().join(SPOOL_DIR_NAME).exists());
    }

    #[test]
    fn listing_includes_dotfiles_and_subdirectories() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        fs::create_dir_all(store.dir().join("nested")).unwrap();
        fs::write(store.dir().join(".hidden.message"), b"a").unwrap();
        fs::write(store.dir().join("nested/deep.message"), b"b").unwrap();
        fs::write(store.dir().join("plain.message"), b"c").unwrap();
        fs::write(store.dir().join("ignored.txt"), b"d").unwrap();
        fs::write(store.dir().join("half.message.tmp"), b"e").unwrap();
        fs::write(store.dir().join("busy.message.processing"), b"f").unwrap();

        let ids: Vec<_> = store
            .list_pending()
            .unwrap()
            .map(|m| m.id.as_str().to_string())
            .collect();
        assert_eq!(ids, [".hidden", "deep", "plain"]);
    }

    #[test]
    fn claim_renames_to_processing_suffix() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue_with_id(&MessageId::new("m1"), b"x").unwrap();

        let claimed = store.claim(&msg).unwrap();

        assert!(!msg.path.exists());
        assert!(claimed.path.exists());
        assert_eq!(claimed.path, msg.processing_path());
    }

    #[test]
    fn second_claim_of_same_file_is_already_claimed() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue_with_id(&MessageId::new("m1"), b"x").unwrap();

        store.claim(&msg).unwrap();
        let second = store.claim(&msg);
        assert!(matches!(second, Err(SpoolError::AlreadyClaimed(id)) if id.as_str() == "m1"));
    }

    #[test]
    fn claim_refuses_to_clobber_existing_processing_file() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue_with_id(&MessageId::new("m1"), b"new").unwrap();
        fs::write(msg.processing_path(), b"old").unwrap();

        assert!(matches!(store.claim(&msg), Err(SpoolError::AlreadyClaimed(_))));
        assert_eq!(fs::read(&msg.path).unwrap(), b"new");
        assert_eq!(fs::read(msg.processing_path()).unwrap(), b"old");
    }

    #[test]
    fn racing_claimers_produce_exactly_one_winner() {
        const CLAIMERS: usize = 8;
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue_with_id(&MessageId::new("contended"), b"x").unwrap();
        let barrier = Barrier::new(CLAIMERS);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..CLAIMERS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        store.claim(&msg)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(SpoolError::AlreadyClaimed(_))))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(losers, CLAIMERS - 1);
    }

    #[test]
    fn read_failure_is_an_io_error() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = SpooledMessage::new(store.dir(), MessageId::new("m1"));
        fs::create_dir_all(msg.processing_path()).unwrap();

        let claimed = ClaimedMessage::from_pending(&msg);
        assert!(matches!(store.read(&claimed), Err(SpoolError::Io(_))));
    }

    #[test]
    fn failed_directory_sync_after_a_change_is_not_an_error() {
        let dir = tempdir().unwrap();
        let id = MessageId::new("m1");

        assert!(sync_after_change(dir.path(), &id, "claim"));
        assert!(!sync_after_change(&dir.path().join("gone"), &id, "claim"));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue_with_id(&MessageId::new("m1"), b"x").unwrap();
        let claimed = store.claim(&msg).unwrap();

        store.delete(&claimed).unwrap();
        assert!(!claimed.path.exists());
        store.delete(&claimed).unwrap();
    }

    #[test]
    fn release_returns_message_to_pending() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue_with_id(&MessageId::new("m1"), b"x").unwrap();
        let claimed = store.claim(&msg).unwrap();

        let released = store.release(&claimed).unwrap();

        assert_eq!(released, msg);
        assert!(msg.path.exists());
        assert!(!claimed.path.exists());
        assert_eq!(store.count_pending().unwrap(), 1);
    }

    #[test]
    fn enqueue_rejects_duplicates_pending_or_claimed() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let id = MessageId::new("dup");
        let msg = store.enqueue_with_id(&id, b"1").unwrap();

        assert!(matches!(
            store.enqueue_with_id(&id, b"2"),
            Err(SpoolError::DuplicateMessage(_))
        ));

        store.claim(&msg).unwrap();
        assert!(matches!(
            store.enqueue_with_id(&id, b"3"),
            Err(SpoolError::DuplicateMessage(_))
        ));
    }

    #[test]
    fn enqueue_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());

        let result = store.enqueue_with_id(&MessageId::new("../escape"), b"x");
        assert!(matches!(result, Err(SpoolError::InvalidMessageId(_))));
        assert!(!dir.path().join("escape.message").exists());
    }

    #[test]
    fn enqueue_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue(b"payload").unwrap();

        assert!(msg.path.exists());
        assert!(!msg.temp_path().exists());
    }

    #[test]
    fn recover_stale_only_touches_old_claims() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue_with_id(&MessageId::new("m1"), b"x").unwrap();
        store.claim(&msg).unwrap();

        assert_eq!(store.recover_stale(Duration::from_secs(3600)).unwrap(), 0);
        assert!(msg.is_claimed());

        assert_eq!(store.recover_stale(Duration::ZERO).unwrap(), 1);
        assert!(msg.is_pending());
        assert!(!msg.is_claimed());
    }

    #[test]
    fn recover_stale_does_not_overwrite_a_new_pending_copy() {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        let msg = store.enqueue_with_id(&MessageId::new("m1"), b"old").unwrap();
        store.claim(&msg).unwrap();
        fs::write(&msg.path, b"new").unwrap();

        assert_eq!(store.recover_stale(Duration::ZERO).unwrap(), 0);
        assert_eq!(fs::read(&msg.path).unwrap(), b"new");
        assert!(msg.is_claimed());
    }
}
