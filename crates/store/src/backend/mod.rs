//! Storage backend abstraction.
//!
//! [`KvBackend`] exposes the Redis-shaped primitive surface the node
//! store is written against: string keys with a conditional set, hashes,
//! sets, an atomic write batch, and an append-only event stream whose
//! entry ids become [`EventId`]s. Two implementations:
//! - [`RedisBackend`] — production;
//! - [`MemoryBackend`] — in-process, used by every test.
//!
//! # Atomicity contract
//!
//! [`KvBackend::commit`] applies the whole [`WriteBatch`] — including
//! the optional event append — atomically with respect to every other
//! backend call: concurrent readers observe all of the batch or none
//! of it, and concurrent commits serialize in some order. Sequence
//! assignment for appended events is the backend's responsibility and
//! is strictly increasing across commits.

mod memory;
mod redis;

use std::collections::HashMap;

use async_trait::async_trait;
use nodewatch_types::EventId;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

use crate::error::Result;

/// One event stream entry as stored, before domain decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Backend-assigned entry id.
    pub id: EventId,
    /// Stored field/value pairs.
    pub fields: HashMap<String, String>,
}

/// A batch of writes applied atomically by [`KvBackend::commit`].
///
/// Operations are applied in insertion order; removals of old index
/// memberships are queued before the writes that replace them.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<WriteOp>,
    pub(crate) event: Option<Vec<(String, String)>>,
}

#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    HashSet { key: String, fields: Vec<(String, String)> },
    StringSet { key: String, value: String },
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
    Delete { key: String },
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a hash write; existing fields not named here are kept.
    pub fn hash_set(mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        self.ops.push(WriteOp::HashSet { key: key.into(), fields });
        self
    }

    /// Queues a plain string write.
    pub fn string_set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(WriteOp::StringSet { key: key.into(), value: value.into() });
        self
    }

    /// Queues a set membership addition.
    pub fn set_add(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetAdd { key: key.into(), member: member.into() });
        self
    }

    /// Queues a set membership removal.
    pub fn set_remove(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetRemove { key: key.into(), member: member.into() });
        self
    }

    /// Queues deletion of a key of any kind.
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    /// Attaches the event appended together with this batch. At most
    /// one event per batch — one mutation, one event.
    pub fn append_event(mut self, fields: Vec<(String, String)>) -> Self {
        self.event = Some(fields);
        self
    }
}

/// Redis-shaped storage primitives.
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Round-trip liveness probe.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the engine is unreachable.
    async fn ping(&self) -> Result<()>;

    /// Sets `key` to `value` only if the key does not exist. Returns
    /// whether the write happened.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    async fn string_set_nx(&self, key: &str, value: &str) -> Result<bool>;

    /// Reads a plain string key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    async fn string_get(&self, key: &str) -> Result<Option<String>>;

    /// Reads all fields of a hash; an absent key yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Members of a set; an absent key yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Members present in both sets.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    async fn set_intersect(&self, first: &str, second: &str) -> Result<Vec<String>>;

    /// Applies the batch atomically. When the batch carries an event
    /// append, returns the id the log assigned to it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure; on failure
    /// nothing from the batch is visible.
    async fn commit(&self, batch: WriteBatch) -> Result<Option<EventId>>;

    /// Reads up to `count` stream entries with ids strictly greater
    /// than `after`; `None` reads from the start of the stream. Does
    /// not block when the stream has no newer entries.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    async fn events_after(&self, after: Option<EventId>, count: usize) -> Result<Vec<RawEvent>>;

    /// Id of the newest stream entry, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    async fn last_event_id(&self) -> Result<Option<EventId>>;
}
