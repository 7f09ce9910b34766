use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;
use vowplan_core::WriteMode;

use crate::store::{Collection, DocKey, DocumentStore, StoreError, Subscription, Watchers, apply_put};

/// In-process document store. Puts can be made to fail on demand so the
/// outbox and session can be exercised against persistence failures.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<DocKey, Map<String, Value>>>,
    watchers: Watchers,
    failing_puts: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` puts fail with a persistence error.
    pub fn fail_next_puts(&self, count: usize) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Number of puts that reached the store, failed ones included.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Current document, bypassing subscriptions.
    pub fn snapshot(&self, collection: Collection, key: &str) -> Option<Value> {
        self.docs
            .lock()
            .get(&DocKey::new(collection, key))
            .cloned()
            .map(Value::Object)
    }

    /// Write a document as another client would: straight into the store,
    /// notifying subscribers.
    pub fn write_remote(&self, collection: Collection, key: &str, doc: Map<String, Value>, mode: WriteMode) {
        let doc_key = DocKey::new(collection, key);
        let snapshot = {
            let mut docs = self.docs.lock();
            let current = docs.entry(doc_key.clone()).or_default();
            vowplan_core::merge_fields(current, doc, mode);
            Value::Object(current.clone())
        };
        self.watchers.publish(&doc_key, snapshot);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.snapshot(collection, key))
    }

    async fn put(
        &self,
        collection: Collection,
        key: &str,
        doc: Map<String, Value>,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let doc_key = DocKey::new(collection, key);

        let failing = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::PersistenceFailure {
                doc: doc_key,
                reason: "injected failure".to_string(),
            });
        }

        let snapshot = {
            let mut docs = self.docs.lock();
            let stored = docs.get(&doc_key).cloned().map(Value::Object);
            let next = apply_put(&doc_key, stored, doc, mode)?;
            docs.insert(doc_key.clone(), next.clone());
            Value::Object(next)
        };
        debug!("MemoryStore put {} ({:?})", doc_key, mode);
        self.watchers.publish(&doc_key, snapshot);
        Ok(())
    }

    fn subscribe(&self, collection: Collection, key: &str) -> Subscription {
        self.watchers
            .subscribe(DocKey::new(collection, key), || self.snapshot(collection, key))
    }
}
