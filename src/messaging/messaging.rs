use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::messaging::config::ConnectOptions;
use crate::messaging::confirmation::ConfirmationHandler;
use crate::messaging::error::MessagingError;
use crate::messaging::handshake::{connect, ConnectFuture};
use crate::messaging::ids::IdGenerator;
use crate::messaging::listener::{ChannelListener, MessageCallback, ReceivedMessage};
use crate::messaging::pending::PendingConfirmations;
use crate::messaging::transport::{MessageEventSource, MessageTarget};

/// A messaging context: the id generator and the pending-confirmation table shared by all
///  connections and listeners on one inbound notification stream.
///
/// Creating the context registers the confirmation handler with the event source. Clones share
///  all state.
#[derive(Clone)]
pub struct Messaging {
    ids: Arc<IdGenerator>,
    pending: Arc<PendingConfirmations>,
    events: Arc<dyn MessageEventSource>,
}
impl Debug for Messaging {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Messaging{{host_token:{:?}, pending:{}}}", self.ids.host_token(), self.pending.len())
    }
}

impl Messaging {
    pub fn new(events: Arc<dyn MessageEventSource>) -> Messaging {
        Messaging::with_id_generator(events, IdGenerator::new())
    }

    pub fn with_id_generator(events: Arc<dyn MessageEventSource>, ids: IdGenerator) -> Messaging {
        let pending = Arc::new(PendingConfirmations::new());
        events.add_listener(Arc::new(ConfirmationHandler::new(pending.clone())));
        debug!(host_token = ids.host_token(), "initialized messaging context");

        Messaging {
            ids: Arc::new(ids),
            pending,
            events,
        }
    }

    /// Starts a handshake with `target`. Invalid options are reported right away, with nothing
    ///  sent; all other failures are reported through the returned future.
    pub fn connect(&self, target: Arc<dyn MessageTarget>, options: &ConnectOptions) -> Result<ConnectFuture, MessagingError> {
        connect(&self.ids, &self.pending, target, options)
    }

    /// Registers a listener for `channel`. An empty `origins` list accepts messages from any
    ///  origin. There is no way to remove a listener.
    pub fn listen(&self, channel: impl Into<Value>, origins: Vec<String>, callback: impl Fn(ReceivedMessage) + Send + Sync + 'static) {
        self.listen_with(channel.into(), origins, Arc::new(callback));
    }

    pub(crate) fn listen_with(&self, channel: Value, origins: Vec<String>, callback: MessageCallback) {
        debug!(?channel, ?origins, "registering listener");
        self.events.add_listener(Arc::new(ChannelListener::new(channel, origins, callback)));
    }

    /// the number of messages sent from this context that are still waiting for a confirmation
    pub fn pending_confirmations(&self) -> usize {
        self.pending.len()
    }

    pub fn host_token(&self) -> &str {
        self.ids.host_token()
    }
}
