//! Persistence outbox.
//!
//! Local state is updated optimistically; the corresponding document writes
//! queue here until the store accepts them. Writes to the same document
//! coalesce, failed writes are retried with exponential backoff, and writes
//! that exhaust their attempts are kept as dead letters (one per document)
//! until they are requeued or discarded.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, error, warn};
use vowplan_core::{WriteMode, merge_fields};

use crate::store::{DocKey, DocumentStore, StoreError};

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl OutboxConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub doc: Map<String, Value>,
    pub mode: WriteMode,
    pub attempts: u32,
    retry_at: Option<Instant>,
}

impl PendingWrite {
    fn new(doc: Map<String, Value>, mode: WriteMode) -> Self {
        Self {
            doc,
            mode,
            attempts: 0,
            retry_at: None,
        }
    }

    /// Lay a newer write over this one. A merge folds its keys in and keeps
    /// this write's mode; a replace supersedes it.
    fn absorb(&mut self, newer: Map<String, Value>, mode: WriteMode) {
        match mode {
            WriteMode::Merge => merge_fields(&mut self.doc, newer, WriteMode::Merge),
            WriteMode::Replace => {
                self.doc = newer;
                self.mode = WriteMode::Replace;
            }
        }
        self.attempts = 0;
        self.retry_at = None;
    }
}

/// A write that was given up on. The local state still holds its values.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub doc: DocKey,
    pub write: PendingWrite,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub retrying: usize,
    pub dead: usize,
    /// Documents whose write was given up on during this flush.
    pub failed: Vec<DocKey>,
}

#[derive(Debug, Default)]
pub struct Outbox {
    config: OutboxConfig,
    pending: IndexMap<DocKey, PendingWrite>,
    dead_letters: IndexMap<DocKey, DeadLetter>,
}

impl Outbox {
    pub fn new(config: OutboxConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Queue a write. A pending write to the same document absorbs it: a
    /// merge folds its keys in, a replace supersedes what was queued.
    pub fn enqueue(&mut self, doc: DocKey, update: Map<String, Value>, mode: WriteMode) {
        match self.pending.get_mut(&doc) {
            Some(existing) => existing.absorb(update, mode),
            None => {
                self.pending.insert(doc, PendingWrite::new(update, mode));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self, doc: &DocKey) -> Option<&PendingWrite> {
        self.pending.get(doc)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn dead_letters(&self) -> impl Iterator<Item = &DeadLetter> {
        self.dead_letters.values()
    }

    pub fn dead_letter(&self, doc: &DocKey) -> Option<&DeadLetter> {
        self.dead_letters.get(doc)
    }

    /// Keys of `doc` that local state owns and the store may not have: the
    /// dead letter with any pending write laid over it. `None` when there is
    /// nothing unsaved.
    pub fn unsaved(&self, doc: &DocKey) -> Option<PendingWrite> {
        let dead = self.dead_letters.get(doc).map(|l| &l.write);
        let pending = self.pending.get(doc);
        match (dead, pending) {
            (None, None) => None,
            (Some(w), None) | (None, Some(w)) => Some(w.clone()),
            (Some(dead), Some(pending)) => {
                let mut combined = dead.clone();
                combined.absorb(pending.doc.clone(), pending.mode);
                Some(combined)
            }
        }
    }

    /// Move dead letters back into the queue for another round of attempts.
    /// A write queued since the failure is newer and wins over the dead
    /// letter's keys.
    pub fn requeue_dead_letters(&mut self) -> usize {
        let dead = std::mem::take(&mut self.dead_letters);
        let count = dead.len();
        for (doc, letter) in dead {
            let mut write = PendingWrite::new(letter.write.doc, letter.write.mode);
            if let Some(newer) = self.pending.shift_remove(&doc) {
                write.absorb(newer.doc, newer.mode);
            }
            self.pending.insert(doc, write);
        }
        count
    }

    /// Drop every dead letter. Returns the documents they belonged to.
    pub fn discard_dead_letters(&mut self) -> Vec<DocKey> {
        std::mem::take(&mut self.dead_letters).into_keys().collect()
    }

    /// Attempt every write that is due. Failures are scheduled for retry or
    /// dead-lettered; none is returned as an error.
    pub async fn flush<S: DocumentStore + ?Sized>(&mut self, store: &S) -> FlushReport {
        let now = Instant::now();
        let due: Vec<DocKey> = self
            .pending
            .iter()
            .filter(|(_, w)| w.retry_at.is_none_or(|at| at <= now))
            .map(|(k, _)| k.clone())
            .collect();

        let mut report = FlushReport::default();
        for doc in due {
            let Some(write) = self.pending.get(&doc) else {
                continue;
            };
            let result = store
                .put(doc.collection, &doc.key, write.doc.clone(), write.mode)
                .await;

            match result {
                Ok(()) => {
                    debug!("Persisted {}", doc);
                    self.pending.shift_remove(&doc);
                    report.written += 1;
                }
                Err(e) => {
                    if self.record_failure(&doc, &e) {
                        report.dead += 1;
                        report.failed.push(doc);
                    } else {
                        report.retrying += 1;
                    }
                }
            }
        }
        report
    }

    /// Flush until nothing is pending, sleeping through the backoff delays.
    pub async fn drain<S: DocumentStore + ?Sized>(&mut self, store: &S) -> FlushReport {
        let mut total = FlushReport::default();
        loop {
            let report = self.flush(store).await;
            total.written += report.written;
            total.dead += report.dead;
            total.failed.extend(report.failed);

            let Some(next) = self.pending.values().filter_map(|w| w.retry_at).min() else {
                return total;
            };
            tokio::time::sleep_until(next).await;
        }
    }

    /// Returns true if the write was dead-lettered.
    fn record_failure(&mut self, doc: &DocKey, e: &StoreError) -> bool {
        let Some(write) = self.pending.get_mut(doc) else {
            return false;
        };
        write.attempts += 1;

        if write.attempts >= self.config.max_attempts {
            error!(
                "Giving up on {} after {} attempts: {}",
                doc, write.attempts, e
            );
            if let Some(write) = self.pending.shift_remove(doc) {
                let reason = e.to_string();
                match self.dead_letters.get_mut(doc) {
                    Some(letter) => {
                        letter.write.absorb(write.doc, write.mode);
                        letter.reason = reason;
                    }
                    None => {
                        self.dead_letters.insert(
                            doc.clone(),
                            DeadLetter {
                                doc: doc.clone(),
                                write,
                                reason,
                            },
                        );
                    }
                }
            }
            return true;
        }

        let delay = self.config.backoff(write.attempts);
        write.retry_at = Some(Instant::now() + delay);
        warn!(
            "Persisting {} failed (attempt {}), retrying in {:?}: {}",
            doc, write.attempts, delay, e
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::Collection;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn planning(key: &str) -> DocKey {
        DocKey::new(Collection::Planning, key)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = OutboxConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(5), Duration::from_millis(1_000));
        assert_eq!(config.backoff(40), Duration::from_millis(1_000));
    }

    #[test]
    fn merges_coalesce_per_document() {
        let mut outbox = Outbox::default();
        outbox.enqueue(planning("u"), object(json!({"a": 1, "b": 1})), WriteMode::Merge);
        outbox.enqueue(planning("u"), object(json!({"b": 2})), WriteMode::Merge);
        outbox.enqueue(planning("other"), object(json!({"c": 1})), WriteMode::Merge);

        assert_eq!(outbox.pending_len(), 2);
        let write = outbox.pending(&planning("u")).unwrap();
        assert_eq!(Value::Object(write.doc.clone()), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_onto_replace_stays_replace() {
        let mut outbox = Outbox::default();
        outbox.enqueue(planning("u"), object(json!({"a": 1})), WriteMode::Replace);
        outbox.enqueue(planning("u"), object(json!({"b": 1})), WriteMode::Merge);
        let write = outbox.pending(&planning("u")).unwrap();
        assert_eq!(write.mode, WriteMode::Replace);
        assert_eq!(Value::Object(write.doc.clone()), json!({"a": 1, "b": 1}));

        outbox.enqueue(planning("u"), object(json!({"z": 0})), WriteMode::Replace);
        let write = outbox.pending(&planning("u")).unwrap();
        assert_eq!(Value::Object(write.doc.clone()), json!({"z": 0}));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_retries_with_backoff() {
        let store = MemoryStore::new();
        store.fail_next_puts(2);
        let mut outbox = Outbox::new(OutboxConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        });
        outbox.enqueue(planning("u"), object(json!({"a": 1})), WriteMode::Merge);

        let report = outbox.flush(&store).await;
        assert_eq!(report.retrying, 1);
        // Not due yet.
        assert_eq!(outbox.flush(&store).await, FlushReport::default());
        assert_eq!(store.put_count(), 1);

        let started = Instant::now();
        let report = outbox.drain(&store).await;
        assert_eq!(report.written, 1);
        assert!(outbox.is_empty());
        // 1 s after the first failure, 2 s after the second.
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(store.put_count(), 3);
        assert_eq!(
            store.snapshot(Collection::Planning, "u"),
            Some(json!({"a": 1}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_write_becomes_dead_letter() {
        let store = MemoryStore::new();
        store.fail_next_puts(10);
        let mut outbox = Outbox::new(OutboxConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
        });
        outbox.enqueue(planning("u"), object(json!({"a": 1})), WriteMode::Merge);

        let report = outbox.drain(&store).await;
        assert_eq!(report.dead, 1);
        assert_eq!(report.failed, vec![planning("u")]);
        assert!(outbox.is_empty());
        assert_eq!(outbox.dead_letters().count(), 1);
        assert_eq!(store.put_count(), 3);

        store.fail_next_puts(0);
        assert_eq!(outbox.requeue_dead_letters(), 1);
        assert_eq!(outbox.drain(&store).await.written, 1);
        assert_eq!(outbox.dead_letters().count(), 0);
    }

    fn dead_outbox() -> Outbox {
        Outbox::new(OutboxConfig {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
        })
    }

    #[tokio::test]
    async fn requeue_keeps_newer_pending_keys() {
        let store = MemoryStore::new();
        store.fail_next_puts(1);
        let mut outbox = dead_outbox();
        outbox.enqueue(
            planning("u"),
            object(json!({"guestList": ["A"], "budget": 1})),
            WriteMode::Merge,
        );
        outbox.flush(&store).await;
        assert!(outbox.dead_letter(&planning("u")).is_some());

        outbox.enqueue(planning("u"), object(json!({"guestList": ["A", "B"]})), WriteMode::Merge);
        outbox.requeue_dead_letters();

        let write = outbox.pending(&planning("u")).unwrap();
        assert_eq!(write.mode, WriteMode::Merge);
        assert_eq!(
            Value::Object(write.doc.clone()),
            json!({"guestList": ["A", "B"], "budget": 1})
        );
    }

    #[tokio::test]
    async fn requeued_replace_absorbs_newer_merge() {
        let store = MemoryStore::new();
        store.fail_next_puts(1);
        let mut outbox = dead_outbox();
        outbox.enqueue(planning("u"), object(json!({"a": 1, "b": 1})), WriteMode::Replace);
        outbox.flush(&store).await;

        outbox.enqueue(planning("u"), object(json!({"b": 2})), WriteMode::Merge);
        assert_eq!(
            outbox.unsaved(&planning("u")).map(|w| Value::Object(w.doc)),
            Some(json!({"a": 1, "b": 2}))
        );
        outbox.requeue_dead_letters();

        let write = outbox.pending(&planning("u")).unwrap();
        assert_eq!(write.mode, WriteMode::Replace);
        assert_eq!(Value::Object(write.doc.clone()), json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn dead_letters_for_one_document_coalesce() {
        let store = MemoryStore::new();
        store.fail_next_puts(2);
        let mut outbox = dead_outbox();
        outbox.enqueue(planning("u"), object(json!({"a": 1})), WriteMode::Merge);
        outbox.flush(&store).await;
        outbox.enqueue(planning("u"), object(json!({"b": 1})), WriteMode::Merge);
        outbox.flush(&store).await;

        assert_eq!(outbox.dead_letters().count(), 1);
        let letter = outbox.dead_letter(&planning("u")).unwrap();
        assert_eq!(Value::Object(letter.write.doc.clone()), json!({"a": 1, "b": 1}));

        assert_eq!(outbox.discard_dead_letters(), vec![planning("u")]);
        assert!(outbox.unsaved(&planning("u")).is_none());
    }
}
