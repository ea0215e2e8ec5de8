pub mod local;

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use serde_json::Value;

/// The one-way, fire-and-forget send primitive of the underlying environment: no
///  acknowledgement, no ordering, no retry.
///
/// The identity of a target is the identity of its `Arc` handle: a confirmation is only accepted
///  if its source is the very handle the message was posted to (see [same_target]). Transports
///  must therefore hand out stable handles for the same peer.
///
/// An `Err` return is treated as a dropped message - it is logged, and the message's timeout
///  takes care of the rest.
#[cfg_attr(test, automock)]
pub trait MessageTarget: Send + Sync + 'static {
    fn post_message(&self, message: Value, target_origin: &str, transfer: &[Bytes]) -> anyhow::Result<()>;
}

/// Compares target handles by identity rather than by value.
pub fn same_target(a: &Arc<dyn MessageTarget>, b: &Arc<dyn MessageTarget>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A single inbound notification, as delivered to every registered [MessageEventHandler] -
///  regardless of who sent it or whom it was meant for.
#[derive(Clone)]
pub struct MessageEvent {
    pub data: Option<Value>,
    pub origin: String,
    pub source: Option<Arc<dyn MessageTarget>>,
}
impl Debug for MessageEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageEvent{{origin:{:?}, has_source:{}, data:{:?}}}", self.origin, self.source.is_some(), self.data)
    }
}

/// Callback for inbound notifications. Handlers are invoked synchronously from the dispatch
///  loop, so they must not block.
pub trait MessageEventHandler: Send + Sync + 'static {
    fn handle_event(&self, event: &MessageEvent);
}

/// The process-wide inbound notification stream. Handlers stay registered for the lifetime of
///  the source.
pub trait MessageEventSource: Send + Sync {
    fn add_listener(&self, handler: Arc<dyn MessageEventHandler>);
}
