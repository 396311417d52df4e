//! Storage layer for nodewatch.
//!
//! Provides [`NodeStore`], the authoritative persistence for node
//! records, their secondary indexes, and the append-only event log.
//! The storage engine is abstracted behind [`KvBackend`] with two
//! implementations:
//! - [`RedisBackend`] — production, over a Redis instance whose
//!   MULTI/EXEC pipeline is the atomicity and serialization point;
//! - [`MemoryBackend`] — in-process, used by every test.
//!
//! All mutating operations commit the record write, the index updates,
//! and the event append as one atomic batch: observers see either all
//! of it or none of it.

pub mod backend;
pub mod error;
pub mod keys;
mod node_store;

pub use backend::{KvBackend, MemoryBackend, RawEvent, RedisBackend, WriteBatch};
pub use error::{Result, StoreError};
pub use node_store::{ListPage, NodeStore, TAIL_BATCH_LIMIT};
