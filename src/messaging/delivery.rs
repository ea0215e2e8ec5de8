use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, error, trace, warn};

use crate::messaging::config::ConnectConfig;
use crate::messaging::envelope::OutboundPayload;
use crate::messaging::error::MessagingError;
use crate::messaging::ids::{EndpointId, MessageId, MessageIdSequence};
use crate::messaging::pending::{PendingConfirmation, PendingConfirmations};
use crate::messaging::transport::MessageTarget;

/// One side of a connection: a fixed target, channel and origin, plus the message numbering.
///  Every message sent through an endpoint is acknowledged independently.
pub struct Endpoint {
    message_ids: MessageIdSequence,
    target: Arc<dyn MessageTarget>,
    channel: Value,
    origin: String,
    timeout: Duration,
    pending: Arc<PendingConfirmations>,
}
impl Debug for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Endpoint{{id:{:?}, channel:{:?}, origin:{:?}}}", self.message_ids.endpoint(), self.channel, self.origin)
    }
}

impl Endpoint {
    pub fn new(id: EndpointId, target: Arc<dyn MessageTarget>, config: &ConnectConfig, pending: Arc<PendingConfirmations>) -> Endpoint {
        Endpoint {
            message_ids: MessageIdSequence::new(id),
            target,
            channel: config.channel.clone(),
            origin: config.origin.clone(),
            timeout: config.timeout,
            pending,
        }
    }

    pub fn id(&self) -> &EndpointId {
        self.message_ids.endpoint()
    }

    /// Sends a single message and returns a future that resolves once the peer confirms it, or
    ///  fails with [MessagingError::Timeout].
    ///
    /// The message is posted and registered before this function returns, and the timeout
    ///  counts from here rather than from the first poll. Failure is only ever reported through
    ///  the returned future. A message whose id is already pending is not sent at all.
    pub fn send(&self, payload: OutboundPayload, transfer: &[Bytes]) -> PendingDelivery {
        let message_id = self.message_ids.next_message_id();
        let deadline = Instant::now() + self.timeout;

        let (entry, confirmed) = PendingConfirmation::new(self.channel.clone(), self.target.clone(), self.origin.clone());
        if let Err(e) = self.pending.insert(message_id.clone(), entry) {
            // the table entry belongs to someone else: neither post nor touch it
            error!("message ids should be unique per process: {} - not sending", e);
            return PendingDelivery::unregistered(message_id, deadline, self.timeout);
        }

        trace!(?message_id, handshake = payload.is_handshake(), "sending message");
        let envelope = payload.into_envelope(&self.channel, &message_id);
        if let Err(e) = self.target.post_message(envelope, &self.origin, transfer) {
            warn!(?message_id, "error posting message, waiting for the timeout: {}", e);
        }

        PendingDelivery::new(message_id, confirmed, deadline, self.timeout, self.pending.clone())
    }
}


/// The outcome of a single send: resolves with `()` when the matching confirmation arrives, or
///  with [MessagingError::Timeout] when it does not arrive in time.
///
/// Dropping a `PendingDelivery` removes its entry from the pending table. A confirmation that
///  arrives afterwards is ignored.
pub struct PendingDelivery {
    message_id: MessageId,
    outcome: Pin<Box<dyn Future<Output = Result<(), MessagingError>> + Send>>,
    /// `None` if the message was never registered
    _cleanup: Option<RemoveOnDrop>,
}
impl Debug for PendingDelivery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PendingDelivery{{message_id:{:?}}}", self.message_id)
    }
}

impl PendingDelivery {
    fn new(message_id: MessageId, confirmed: oneshot::Receiver<()>, deadline: Instant, timeout: Duration, pending: Arc<PendingConfirmations>) -> PendingDelivery {
        let millis = timeout.as_millis() as u64;
        let id = message_id.clone();
        let table = pending.clone();

        let outcome = Box::pin(async move {
            match timeout_at(deadline, confirmed).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => {
                    // the entry went away without a confirmation - nothing left to wait for but the deadline
                    sleep_until(deadline).await;
                    Err(MessagingError::Timeout { millis })
                }
                Err(_) => {
                    table.remove(&id);
                    debug!(message_id = ?id, "message was not confirmed within {} ms", millis);
                    Err(MessagingError::Timeout { millis })
                }
            }
        });

        PendingDelivery {
            _cleanup: Some(RemoveOnDrop {
                pending,
                message_id: message_id.clone(),
            }),
            message_id,
            outcome,
        }
    }

    /// A delivery for a message that could not be registered, and therefore was not sent. It
    ///  fails at its deadline like any unconfirmed message, and it never touches the pending
    ///  table.
    fn unregistered(message_id: MessageId, deadline: Instant, timeout: Duration) -> PendingDelivery {
        let millis = timeout.as_millis() as u64;
        PendingDelivery {
            message_id,
            outcome: Box::pin(async move {
                sleep_until(deadline).await;
                Err(MessagingError::Timeout { millis })
            }),
            _cleanup: None,
        }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }
}

impl Future for PendingDelivery {
    type Output = Result<(), MessagingError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.outcome.as_mut().poll(cx)
    }
}

struct RemoveOnDrop {
    pending: Arc<PendingConfirmations>,
    message_id: MessageId,
}
impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.pending.remove(&self.message_id).is_some() {
            trace!(message_id = ?self.message_id, "pending delivery was dropped before it was settled");
        }
    }
}
