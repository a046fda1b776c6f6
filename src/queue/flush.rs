use tracing::{debug, instrument, warn};

use super::{FlushPolicy, QueueProcessor};
use crate::codec::MessageCodec;
use crate::transport::{FlushReport, Spool, Transport, TransportError};

impl<S, T, K, C> QueueProcessor<S, T, K, C>
where
    C: MessageCodec,
    S: Spool<C::Message>,
    T: Transport<C::Message>,
{
    /// Drains the live transport's spool into the real transport.
    ///
    /// With [`FlushPolicy::BestEffort`] a transport error is logged and an
    /// empty report returned; with [`FlushPolicy::Strict`] it is returned.
    #[instrument(skip(self))]
    pub fn flush(&self, policy: FlushPolicy) -> Result<FlushReport, TransportError> {
        match self.live.spool().flush_queue(&self.transport) {
            Ok(report) => {
                debug!(sent = report.sent, refused = report.failed_recipients.len(), "flushed");
                Ok(report)
            }
            Err(e) if policy == FlushPolicy::BestEffort => {
                warn!(error = %e, "discarding flush error");
                Ok(FlushReport::default())
            }
            Err(e) => Err(e),
        }
    }
}
