//! In-memory backend for testing.
//!
//! Mirrors the Redis data shapes with plain maps behind one mutex; the
//! mutex is the atomicity and serialization point. Event ids are
//! synthesized as `(0, n)` from a monotonic counter, which preserves
//! the strictly-increasing contract.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use nodewatch_types::EventId;
use parking_lot::Mutex;

use super::{KvBackend, RawEvent, WriteBatch, WriteOp};
use crate::error::Result;

/// In-process [`KvBackend`]. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    events: Vec<RawEvent>,
    next_seq: u64,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::HashSet { key, fields } => {
                self.hashes.entry(key).or_default().extend(fields);
            },
            WriteOp::StringSet { key, value } => {
                self.strings.insert(key, value);
            },
            WriteOp::SetAdd { key, member } => {
                self.sets.entry(key).or_default().insert(member);
            },
            WriteOp::SetRemove { key, member } => {
                if let Some(set) = self.sets.get_mut(&key) {
                    set.remove(&member);
                    if set.is_empty() {
                        self.sets.remove(&key);
                    }
                }
            },
            WriteOp::Delete { key } => {
                self.strings.remove(&key);
                self.hashes.remove(&key);
                self.sets.remove(&key);
            },
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn string_set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut state = self.inner.lock();
        if state.strings.contains_key(key) {
            return Ok(false);
        }
        state.strings.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn string_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().strings.get(key).cloned())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.inner.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_intersect(&self, first: &str, second: &str) -> Result<Vec<String>> {
        let state = self.inner.lock();
        match (state.sets.get(first), state.sets.get(second)) {
            (Some(a), Some(b)) => Ok(a.intersection(b).cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Option<EventId>> {
        let mut state = self.inner.lock();
        for op in batch.ops {
            state.apply(op);
        }

        let assigned = batch.event.map(|fields| {
            let id = EventId::new(0, state.next_seq);
            state.next_seq += 1;
            state.events.push(RawEvent { id, fields: fields.into_iter().collect() });
            id
        });

        Ok(assigned)
    }

    async fn events_after(&self, after: Option<EventId>, count: usize) -> Result<Vec<RawEvent>> {
        let state = self.inner.lock();
        let events = state
            .events
            .iter()
            .filter(|event| after.is_none_or(|cursor| event.id > cursor))
            .take(count)
            .cloned()
            .collect();
        Ok(events)
    }

    async fn last_event_id(&self) -> Result<Option<EventId>> {
        Ok(self.inner.lock().events.last().map(|event| event.id))
    }
}
