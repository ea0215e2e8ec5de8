//! An in-process transport: every [LocalContext] is one execution context with its own origin
//!  and inbound notification stream, and contexts post messages to each other through
//!  [LocalContext::window_to] handles.
//!
//! Delivery is asynchronous: a posted message is queued in the receiving context's inbox and
//!  dispatched by [LocalContext::recv_loop] (or by [LocalContext::deliver_pending] for
//!  step-by-step tests), never from inside `post_message`.

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use anyhow::anyhow;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use crate::messaging::config::WILDCARD_ORIGIN;
use crate::messaging::transport::{MessageEvent, MessageEventHandler, MessageEventSource, MessageTarget};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Fans every inbound notification out to all registered handlers
#[derive(Default)]
pub struct EventHub {
    handlers: RwLock<Vec<Arc<dyn MessageEventHandler>>>,
}
impl Debug for EventHub {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventHub{{num_listeners:{}}}", self.num_listeners())
    }
}

impl EventHub {
    pub fn new() -> EventHub {
        Default::default()
    }

    pub fn dispatch(&self, event: &MessageEvent) {
        // handlers may register further handlers, so they are called on a snapshot
        let handlers = self.handlers.read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for handler in handlers {
            handler.handle_event(event);
        }
    }

    pub fn num_listeners(&self) -> usize {
        self.handlers.read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl MessageEventSource for EventHub {
    fn add_listener(&self, handler: Arc<dyn MessageEventHandler>) {
        self.handlers.write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }
}


pub struct LocalContext {
    id: u64,
    origin: String,
    hub: Arc<EventHub>,
    inbox_sender: mpsc::UnboundedSender<MessageEvent>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<MessageEvent>>,
    cancel_sender: broadcast::Sender<()>,
    windows: Mutex<FxHashMap<u64, Arc<ContextWindow>>>,
    myself: Weak<LocalContext>,
}
impl Debug for LocalContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalContext{{id:{}, origin:{:?}}}", self.id, self.origin)
    }
}

impl LocalContext {
    pub fn new(origin: impl Into<String>) -> Arc<LocalContext> {
        let (inbox_sender, inbox) = mpsc::unbounded_channel();
        let (cancel_sender, _) = broadcast::channel(1);

        Arc::new_cyclic(|myself| LocalContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            origin: origin.into(),
            hub: Default::default(),
            inbox_sender,
            inbox: tokio::sync::Mutex::new(inbox),
            cancel_sender,
            windows: Default::default(),
            myself: myself.clone(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// This context's inbound notification stream
    pub fn events(&self) -> Arc<EventHub> {
        self.hub.clone()
    }

    /// The handle through which this context posts messages to `other`. Repeated calls for the
    ///  same peer return the same handle, and messages arriving from `other` carry exactly this
    ///  handle as their source.
    pub fn window_to(&self, other: &Arc<LocalContext>) -> Arc<dyn MessageTarget> {
        self.windows.lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(other.id)
            .or_insert_with(|| Arc::new(ContextWindow {
                from: self.myself.clone(),
                to: Arc::downgrade(other),
            }))
            .clone()
    }

    fn enqueue(&self, event: MessageEvent) -> anyhow::Result<()> {
        self.inbox_sender.send(event)
            .map_err(|_| anyhow!("inbox of {:?} is closed", self.origin))
    }

    /// Dispatches everything that is queued right now, including messages that are queued while
    ///  dispatching, and returns the number of dispatched notifications. Returns 0 without doing
    ///  anything while a [LocalContext::recv_loop] is running.
    pub fn deliver_pending(&self) -> usize {
        let Ok(mut inbox) = self.inbox.try_lock() else {
            return 0;
        };

        let mut num_delivered = 0;
        while let Ok(event) = inbox.try_recv() {
            self.hub.dispatch(&event);
            num_delivered += 1;
        }
        num_delivered
    }

    /// Dispatches inbound notifications as they arrive, until [LocalContext::cancel_recv_loop]
    ///  is called
    pub async fn recv_loop(&self) -> anyhow::Result<()> {
        let mut cancel_receiver = self.cancel_sender.subscribe();
        let mut inbox = self.inbox.lock().await;

        trace!(origin = ?self.origin, "starting receive loop");

        loop {
            tokio::select! {
                event = inbox.recv() => {
                    match event {
                        Some(event) => self.hub.dispatch(&event),
                        None => break,
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }

        info!(origin = ?self.origin, "shutting down receive loop");
        Ok(())
    }

    pub fn cancel_recv_loop(&self) {
        match self.cancel_sender.send(()) {
            Ok(_) => info!("canceling receive loop"),
            Err(_) => debug!("call to cancel_recv_loop while no receive loop is running"),
        }
    }
}


/// One context's view of another: posting to it queues a notification in the other context,
///  stamped with the sender's origin and the reverse handle as its source
struct ContextWindow {
    from: Weak<LocalContext>,
    to: Weak<LocalContext>,
}

impl MessageTarget for ContextWindow {
    fn post_message(&self, message: Value, target_origin: &str, transfer: &[Bytes]) -> anyhow::Result<()> {
        let (Some(from), Some(to)) = (self.from.upgrade(), self.to.upgrade()) else {
            return Err(anyhow!("context was shut down"));
        };

        if target_origin != WILDCARD_ORIGIN && target_origin != to.origin {
            trace!(?target_origin, actual = ?to.origin, "target origin does not match - dropping message");
            return Ok(());
        }
        if !transfer.is_empty() {
            trace!("in-process delivery shares values - ignoring {} transfer buffers", transfer.len());
        }

        to.enqueue(MessageEvent {
            data: Some(message),
            origin: from.origin.clone(),
            source: Some(to.window_to(&from)),
        })
    }
}
