//! Core types for the nodewatch service.
//!
//! This crate provides the foundational types used throughout nodewatch:
//! - The node record and its enumerations (type, status)
//! - Event log entries and their typed sequence identifiers
//! - Centralized postcard codec helpers with snafu error handling

pub mod codec;
pub mod events;
pub mod types;

// Re-export commonly used types at crate root
pub use codec::{CodecError, decode, encode};
pub use events::{EventId, EventKind, EventRecord, ParseEventIdError};
pub use types::{Node, NodeDraft, NodeStatus, NodeType};
