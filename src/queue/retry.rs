use tracing::{debug, error, info, instrument, warn};

use super::{QueueProcessor, RetryError, RetryReport, SkipReason};
use crate::cache::{Cache, DebounceLock, LockState};
use crate::codec::MessageCodec;
use crate::config::PartialFailurePolicy;
use crate::spool::{ClaimedMessage, SpoolError, SpooledMessage};
use crate::transport::Transport;

/// What became of one claimed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    /// The transport took the message.
    Accepted,

    /// The entry went back to pending without being sent.
    Skipped,
}

impl<S, T, K, C> QueueProcessor<S, T, K, C>
where
    C: MessageCodec,
    T: Transport<C::Message>,
    K: Cache,
{
    /// Redelivers messages left in the spool store.
    ///
    /// Returns an empty report without touching the store when the debounce
    /// token is live or the spool directory does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RetryError::Cache` if the debounce token cannot be checked or
    /// stored, `RetryError::Spool` if the spool directory cannot be listed,
    /// and `RetryError::Transport` if the transport itself fails. In the last
    /// case the message being sent is back in the pending set. A message the
    /// server rejects is put back and the run continues.
    #[instrument(skip(self), fields(spool = %self.store.dir().display()))]
    pub fn retry(&self) -> Result<RetryReport, RetryError> {
        let lock = DebounceLock::new(&self.cache, &self.config.lock_key, self.config.lock_ttl);
        if lock.try_acquire()? == LockState::AlreadyHeld {
            debug!("retry ran recently, skipping");
            return Ok(RetryReport::not_run(SkipReason::LockHeld));
        }

        if !self.store.exists() {
            debug!("no spool directory, nothing to retry");
            return Ok(RetryReport::not_run(SkipReason::NoSpool));
        }

        let mut report = RetryReport::default();
        let mut accepted = 0usize;

        for message in self.store.list_pending()? {
            if self.config.max_batch.is_some_and(|max| accepted >= max) {
                debug!(max_batch = accepted, "batch limit reached");
                break;
            }

            let Some(claimed) = self.claim_or_skip(&message, &mut report) else {
                continue;
            };

            // Only entries the transport accepted count toward the batch.
            if self.process_claimed(&claimed, &mut report)? == Handled::Accepted {
                accepted += 1;
            }
        }

        info!(
            delivered = report.delivered,
            requeued = report.requeued,
            skipped = report.skipped,
            refused = report.failed_recipients.len(),
            "retry run finished"
        );
        Ok(report)
    }

    fn claim_or_skip(
        &self,
        message: &SpooledMessage,
        report: &mut RetryReport,
    ) -> Option<ClaimedMessage> {
        match self.store.claim(message) {
            Ok(claimed) => Some(claimed),
            Err(SpoolError::AlreadyClaimed(id)) => {
                debug!(%id, "claimed by another run");
                report.skipped += 1;
                None
            }
            Err(e) => {
                warn!(id = %message.id, error = %e, "could not claim message");
                report.skipped += 1;
                None
            }
        }
    }

    /// Decodes, sends and completes one claimed message.
    ///
    /// Only a transport-wide error is returned; anything else, a rejection
    /// included, is confined to this message.
    fn process_claimed(
        &self,
        claimed: &ClaimedMessage,
        report: &mut RetryReport,
    ) -> Result<Handled, RetryError> {
        let decoded = match self.decode(claimed) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(id = %claimed.id, error = %e, "skipping unreadable message");
                self.release_quietly(claimed);
                report.skipped += 1;
                return Ok(Handled::Skipped);
            }
        };

        let sent = match self.transport.send(&decoded) {
            Ok(sent) => sent,
            Err(e) if e.is_message_scoped() => {
                warn!(id = %claimed.id, error = %e, "message rejected, leaving it for the next run");
                self.release_quietly(claimed);
                report.skipped += 1;
                return Ok(Handled::Skipped);
            }
            Err(source) => {
                error!(id = %claimed.id, error = %source, "transport failed, aborting retry run");
                self.release_quietly(claimed);
                return Err(RetryError::Transport {
                    id: claimed.id.clone(),
                    source,
                });
            }
        };

        if !sent.is_complete() {
            warn!(
                id = %claimed.id,
                refused = sent.failed_recipients.len(),
                policy = %self.config.on_partial_failure,
                "recipients refused"
            );
        }

        if !sent.is_complete() && self.config.on_partial_failure == PartialFailurePolicy::Requeue {
            self.release_quietly(claimed);
            report.requeued += 1;
        } else {
            // The message went out; a leftover claim is not redelivered by
            // later runs, so failing to remove it is logged, not returned.
            if let Err(e) = self.store.delete(claimed) {
                error!(id = %claimed.id, error = %e, "delivered message could not be removed");
            }
            report.delivered += 1;
        }

        report.failed_recipients.extend(sent.failed_recipients);
        Ok(Handled::Accepted)
    }

    fn decode(&self, claimed: &ClaimedMessage) -> Result<C::Message, SpoolError> {
        let bytes = self.store.read(claimed)?;
        self.codec
            .decode(&bytes)
            .map_err(|e| SpoolError::CorruptPayload {
                id: claimed.id.clone(),
                reason: e.to_string(),
            })
    }

    fn release_quietly(&self, claimed: &ClaimedMessage) {
        if let Err(e) = self.store.release(claimed) {
            error!(id = %claimed.id, error = %e, "could not release claimed message");
        }
    }
}
