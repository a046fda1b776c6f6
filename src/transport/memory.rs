//! In-memory transport spool.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::{debug, warn};

use super::{FlushReport, Spool, Transport, TransportError};

/// A FIFO queue held in process memory.
///
/// Messages are lost if the process exits before a flush; the durable
/// [`SpoolStore`](crate::spool::SpoolStore) is what survives crashes.
#[derive(Debug)]
pub struct MemorySpool<M> {
    queue: Mutex<VecDeque<M>>,
}

impl<M> Default for MemorySpool<M> {
    fn default() -> Self {
        MemorySpool {
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl<M> MemorySpool<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<M> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    fn push_front(&self, message: M) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_front(message);
    }
}

impl<M> Spool<M> for MemorySpool<M> {
    fn queue_message(&self, message: M) -> Result<(), TransportError> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(message);
        Ok(())
    }

    fn flush_queue(&self, transport: &dyn Transport<M>) -> Result<FlushReport, TransportError> {
        let mut report = FlushReport::default();

        // The lock is not held across sends, so messages queued during the
        // flush are picked up by this same flush.
        while let Some(message) = self.pop() {
            match transport.send(&message) {
                Ok(sent) => {
                    report.sent += 1;
                    report.failed_recipients.extend(sent.failed_recipients);
                }
                Err(e) => {
                    warn!(error = %e, remaining = self.len() + 1, "flush interrupted");
                    self.push_front(message);
                    return Err(e);
                }
            }
        }

        debug!(sent = report.sent, "spool flushed");
        Ok(report)
    }
}
