use std::sync::Arc;

use tracing::{debug, trace};

use crate::messaging::envelope::InboundConfirmation;
use crate::messaging::pending::{PendingConfirmations, TakeResult};
use crate::messaging::transport::{MessageEvent, MessageEventHandler};

/// The inbound handler that resolves pending sends. There is exactly one per
///  [crate::messaging::messaging::Messaging] context, installed when the context is created.
///
/// Everything that is not a correctly correlated confirmation is dropped without an error - the
///  inbound stream is shared, and foreign traffic must not disturb pending entries. Drops are
///  visible at trace level.
pub struct ConfirmationHandler {
    pending: Arc<PendingConfirmations>,
}
impl ConfirmationHandler {
    pub fn new(pending: Arc<PendingConfirmations>) -> ConfirmationHandler {
        ConfirmationHandler {
            pending,
        }
    }
}

impl MessageEventHandler for ConfirmationHandler {
    fn handle_event(&self, event: &MessageEvent) {
        let Some(InboundConfirmation { channel, message_id }) = InboundConfirmation::decode(event.data.as_ref()) else {
            return;
        };

        let taken = self.pending.take_if(&message_id, |entry| {
            entry.accepts(event.source.as_ref(), channel.as_ref(), &event.origin)
        });

        match taken {
            TakeResult::Taken(entry) => {
                debug!(?message_id, "message was confirmed");
                entry.complete();
            }
            TakeResult::Rejected => {
                trace!(?message_id, origin = ?event.origin, "confirmation does not match the pending message's target, channel or origin - ignoring");
            }
            TakeResult::NotPending => {
                trace!(?message_id, "confirmation for a message that is not pending - ignoring");
            }
        }
    }
}
