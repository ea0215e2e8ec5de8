use std::collections::hash_map::Entry;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::messaging::config::WILDCARD_ORIGIN;
use crate::messaging::ids::MessageId;
use crate::messaging::transport::{same_target, MessageTarget};

/// Bookkeeping for one message that was sent and is waiting for its confirmation: what the
///  confirmation must look like to be accepted, and how to wake up the sender.
pub struct PendingConfirmation {
    confirm: oneshot::Sender<()>,
    pub channel: Value,
    pub target: Arc<dyn MessageTarget>,
    pub target_origin: String,
}
impl Debug for PendingConfirmation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PendingConfirmation{{channel:{:?}, target_origin:{:?}}}", self.channel, self.target_origin)
    }
}

impl PendingConfirmation {
    pub fn new(channel: Value, target: Arc<dyn MessageTarget>, target_origin: String) -> (PendingConfirmation, oneshot::Receiver<()>) {
        let (confirm, confirmed) = oneshot::channel();
        let entry = PendingConfirmation {
            confirm,
            channel,
            target,
            target_origin,
        };
        (entry, confirmed)
    }

    /// A confirmation correlates with this entry only if it comes from the target the message
    ///  was posted to, on the same channel, and - unless the message was posted to the wildcard
    ///  origin - from the origin it was posted to.
    pub fn accepts(&self, source: Option<&Arc<dyn MessageTarget>>, channel: Option<&Value>, origin: &str) -> bool {
        let Some(source) = source else {
            return false;
        };
        same_target(source, &self.target)
            && channel == Some(&self.channel)
            && (self.target_origin == WILDCARD_ORIGIN || self.target_origin == origin)
    }

    /// Wakes up the sender. A sender that went away in the meantime is not an error.
    pub fn complete(self) {
        let _ = self.confirm.send(());
    }
}


#[derive(Debug)]
pub enum TakeResult {
    Taken(PendingConfirmation),
    /// there is an entry, but the predicate rejected it - it stays in the table
    Rejected,
    NotPending,
}

/// The table of all messages awaiting confirmation, keyed by message id. One table is shared by
///  all connections of a [crate::messaging::messaging::Messaging] context.
///
/// Every operation is atomic: of a timeout and a matching confirmation racing for the same id,
///  exactly one gets the entry, and the other finds nothing.
#[derive(Default)]
pub struct PendingConfirmations {
    entries: Mutex<FxHashMap<MessageId, PendingConfirmation>>,
}
impl Debug for PendingConfirmations {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PendingConfirmations{{len:{}}}", self.len())
    }
}

impl PendingConfirmations {
    pub fn new() -> PendingConfirmations {
        Default::default()
    }

    fn entries(&self) -> MutexGuard<'_, FxHashMap<MessageId, PendingConfirmation>> {
        // the map is never left in an inconsistent state, so a poisoned lock is still usable
        self.entries.lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, message_id: MessageId, entry: PendingConfirmation) -> anyhow::Result<()> {
        match self.entries().entry(message_id) {
            Entry::Occupied(e) => {
                Err(anyhow!("there is already a pending confirmation for message id {:?}", e.key()))
            }
            Entry::Vacant(e) => {
                e.insert(entry);
                Ok(())
            }
        }
    }

    /// Removing an id that is not (or no longer) pending is a no-op.
    pub fn remove(&self, message_id: &MessageId) -> Option<PendingConfirmation> {
        self.entries().remove(message_id)
    }

    /// removes the entry for `message_id` if and only if `predicate` accepts it
    pub fn take_if(&self, message_id: &MessageId, predicate: impl FnOnce(&PendingConfirmation) -> bool) -> TakeResult {
        let mut entries = self.entries();
        let accepted = match entries.get(message_id) {
            None => return TakeResult::NotPending,
            Some(entry) => predicate(entry),
        };
        if !accepted {
            return TakeResult::Rejected;
        }

        match entries.remove(message_id) {
            Some(entry) => TakeResult::Taken(entry),
            None => TakeResult::NotPending,
        }
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.entries().contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use crate::messaging::transport::MockMessageTarget;
    use super::*;

    fn target() -> Arc<dyn MessageTarget> {
        Arc::new(MockMessageTarget::new())
    }

    #[test]
    fn test_insert_and_remove() {
        let table = PendingConfirmations::new();
        let (entry, _confirmed) = PendingConfirmation::new(json!("c"), target(), "*".to_string());
        table.insert(MessageId::from("a"), entry).unwrap();
        assert!(table.contains(&MessageId::from("a")));
        assert_eq!(table.len(), 1);

        assert!(table.remove(&MessageId::from("a")).is_some());
        assert!(table.remove(&MessageId::from("a")).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let table = PendingConfirmations::new();
        let (first, _c1) = PendingConfirmation::new(json!("first"), target(), "*".to_string());
        let (second, _c2) = PendingConfirmation::new(json!("second"), target(), "*".to_string());
        table.insert(MessageId::from("a"), first).unwrap();
        assert!(table.insert(MessageId::from("a"), second).is_err());

        assert_eq!(table.remove(&MessageId::from("a")).unwrap().channel, json!("first"));
    }

    #[test]
    fn test_take_if() {
        let table = PendingConfirmations::new();
        let (entry, _confirmed) = PendingConfirmation::new(json!("c"), target(), "*".to_string());
        table.insert(MessageId::from("a"), entry).unwrap();

        assert!(matches!(table.take_if(&MessageId::from("b"), |_| true), TakeResult::NotPending));
        assert!(matches!(table.take_if(&MessageId::from("a"), |_| false), TakeResult::Rejected));
        assert!(table.contains(&MessageId::from("a")));
        assert!(matches!(table.take_if(&MessageId::from("a"), |_| true), TakeResult::Taken(_)));
        assert!(matches!(table.take_if(&MessageId::from("a"), |_| true), TakeResult::NotPending));
    }

    #[test]
    fn test_complete_wakes_up_the_sender() {
        let (entry, mut confirmed) = PendingConfirmation::new(json!("c"), target(), "*".to_string());
        entry.complete();
        assert!(confirmed.try_recv().is_ok());
    }

    #[test]
    fn test_complete_after_sender_went_away() {
        let (entry, confirmed) = PendingConfirmation::new(json!("c"), target(), "*".to_string());
        drop(confirmed);
        entry.complete();
    }

    #[test]
    fn test_accepts() {
        let the_target = target();
        let other_target = target();

        let (entry, _c) = PendingConfirmation::new(json!("c"), the_target.clone(), "https://o".to_string());
        assert!(entry.accepts(Some(&the_target), Some(&json!("c")), "https://o"));
        assert!(!entry.accepts(None, Some(&json!("c")), "https://o"));
        assert!(!entry.accepts(Some(&other_target), Some(&json!("c")), "https://o"));
        assert!(!entry.accepts(Some(&the_target), Some(&json!("d")), "https://o"));
        assert!(!entry.accepts(Some(&the_target), None, "https://o"));
        assert!(!entry.accepts(Some(&the_target), Some(&json!("c")), "https://other"));

        let (wildcard, _c) = PendingConfirmation::new(json!("c"), the_target.clone(), "*".to_string());
        assert!(wildcard.accepts(Some(&the_target), Some(&json!("c")), "https://anything"));
        assert!(!wildcard.accepts(Some(&other_target), Some(&json!("c")), "https://anything"));
    }
}
