use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::messaging::config::ConnectOptions;
use crate::messaging::error::MessagingError;
use crate::messaging::handshake::ConnectFuture;
use crate::messaging::listener::{MessageCallback, ReceivedMessage};
use crate::messaging::messaging::Messaging;
use crate::messaging::transport::MessageTarget;

/// A bidirectional peer in one call: a listener on the connection's channel plus an outbound
///  connection to `peer`
pub struct AgentOptions {
    pub peer: Arc<dyn MessageTarget>,
    pub connect: ConnectOptions,
    pub on_message: MessageCallback,
}
impl Debug for AgentOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgentOptions{{connect:{:?}}}", self.connect)
    }
}

impl AgentOptions {
    pub fn new(peer: Arc<dyn MessageTarget>, connect: ConnectOptions, on_message: impl Fn(ReceivedMessage) + Send + Sync + 'static) -> AgentOptions {
        AgentOptions {
            peer,
            connect,
            on_message: Arc::new(on_message),
        }
    }
}

impl Messaging {
    /// Registers a listener on the options' channel (restricted to the options' origin, if one
    ///  is given) and connects to the peer.
    ///
    /// The options are validated before anything else happens: on an error, neither a listener
    ///  is registered nor a message sent.
    pub fn create_agent(&self, options: AgentOptions) -> Result<ConnectFuture, MessagingError> {
        options.connect.validate()?;

        let origins = options.connect.origin_restriction()
            .map(|origin| vec![origin.to_string()])
            .unwrap_or_default();
        self.listen_with(options.connect.channel.clone(), origins, options.on_message);

        self.connect(options.peer, &options.connect)
    }
}
