use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use vowplan_core::WriteMode;

/// The three document collections, one document per user in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Planning,
    Proposal,
    Simulator,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Planning,
        Collection::Proposal,
        Collection::Simulator,
    ];

    /// Collection name as stored.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Planning => "weddings",
            Collection::Proposal => "proposals",
            Collection::Simulator => "simulations",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A document address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub collection: Collection,
    pub key: String,
}

impl DocKey {
    pub fn new(collection: Collection, key: impl Into<String>) -> Self {
        Self {
            collection,
            key: key.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.key)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to persist {doc}: {reason}")]
    PersistenceFailure { doc: DocKey, reason: String },

    #[error("Failed to read {doc}: {reason}")]
    ReadFailure { doc: DocKey, reason: String },

    #[error("Stored document {0} is not a JSON object")]
    NotAnObject(DocKey),
}

/// Remote document store: get / put / subscribe by key.
///
/// `put` with [`WriteMode::Merge`] must apply exactly the shallow merge of
/// [`vowplan_core::merge_fields`]; last write wins.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError>;

    async fn put(
        &self,
        collection: Collection,
        key: &str,
        doc: Map<String, Value>,
        mode: WriteMode,
    ) -> Result<(), StoreError>;

    /// Watch a document. The first poll yields the current snapshot (`None`
    /// when the document does not exist). Dropping the subscription
    /// unsubscribes.
    fn subscribe(&self, collection: Collection, key: &str) -> Subscription;
}

/// Snapshot stream for one document. Only the newest snapshot is kept;
/// intermediate ones may be skipped.
pub struct Subscription {
    doc: DocKey,
    rx: watch::Receiver<Option<Value>>,
    initial_pending: bool,
}

impl Subscription {
    pub fn doc(&self) -> &DocKey {
        &self.doc
    }

    /// The newest snapshot, if one arrived since the last call.
    pub fn try_next(&mut self) -> Option<Option<Value>> {
        if self.initial_pending || self.rx.has_changed().unwrap_or(false) {
            self.initial_pending = false;
            return Some(self.rx.borrow_and_update().clone());
        }
        None
    }

    /// Wait for the next snapshot. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        if !self.initial_pending {
            self.rx.changed().await.ok()?;
        }
        self.initial_pending = false;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Per-document snapshot channels shared by the store implementations.
#[derive(Default)]
pub(crate) struct Watchers {
    senders: Mutex<HashMap<DocKey, watch::Sender<Option<Value>>>>,
}

impl Watchers {
    /// Subscribe to `doc`, seeding the channel with `current` if nobody has
    /// watched it yet.
    pub(crate) fn subscribe(&self, doc: DocKey, current: impl FnOnce() -> Option<Value>) -> Subscription {
        let mut senders = self.senders.lock();
        let sender = senders
            .entry(doc.clone())
            .or_insert_with(|| watch::channel(current()).0);
        Subscription {
            doc,
            rx: sender.subscribe(),
            initial_pending: true,
        }
    }

    pub(crate) fn publish(&self, doc: &DocKey, snapshot: Value) {
        let mut senders = self.senders.lock();
        if let Some(sender) = senders.get(doc) {
            sender.send_replace(Some(snapshot));
            if sender.receiver_count() == 0 {
                senders.remove(doc);
            }
        }
    }
}

/// Apply a put to an optional stored document, returning the new document.
pub(crate) fn apply_put(
    doc: &DocKey,
    stored: Option<Value>,
    update: Map<String, Value>,
    mode: WriteMode,
) -> Result<Map<String, Value>, StoreError> {
    let mut current = match stored {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) if mode == WriteMode::Replace => Map::new(),
        Some(_) => return Err(StoreError::NotAnObject(doc.clone())),
    };
    vowplan_core::merge_fields(&mut current, update, mode);
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_names() {
        let names: Vec<_> = Collection::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["weddings", "proposals", "simulations"]);
    }

    #[test]
    fn first_poll_yields_current_snapshot() {
        let watchers = Watchers::default();
        let doc = DocKey::new(Collection::Planning, "u1");
        let mut sub = watchers.subscribe(doc.clone(), || None);
        assert_eq!(sub.try_next(), Some(None));
        assert_eq!(sub.try_next(), None);

        watchers.publish(&doc, json!({"a": 1}));
        watchers.publish(&doc, json!({"a": 2}));
        // Only the newest snapshot is delivered.
        assert_eq!(sub.try_next(), Some(Some(json!({"a": 2}))));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn dropped_subscriptions_release_the_channel() {
        let watchers = Watchers::default();
        let doc = DocKey::new(Collection::Simulator, "u1");
        drop(watchers.subscribe(doc.clone(), || None));
        watchers.publish(&doc, json!({}));
        assert!(watchers.senders.lock().is_empty());
    }

    #[test]
    fn apply_put_merges_shallowly() {
        let doc = DocKey::new(Collection::Planning, "u1");
        let stored = json!({"a": {"x": 1}, "b": 2});
        let update = json!({"a": {"y": 3}});
        let Value::Object(update) = update else { unreachable!() };
        let merged = apply_put(&doc, Some(stored), update, WriteMode::Merge).unwrap();
        assert_eq!(Value::Object(merged), json!({"a": {"y": 3}, "b": 2}));
    }

    #[test]
    fn apply_put_rejects_non_object_merge_target() {
        let doc = DocKey::new(Collection::Planning, "u1");
        let err = apply_put(&doc, Some(json!([1])), Map::new(), WriteMode::Merge).unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject(_)));
    }
}
