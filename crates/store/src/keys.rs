//! Key encoding for the persisted layout.
//!
//! The layout is shared with external tooling and must stay stable:
//!
//! | Key | Holds |
//! |---|---|
//! | `node:{id}` | record hash |
//! | `node:byname:{type}:{name}` | id, enforces `(type, name)` uniqueness |
//! | `nodes:all` | set of all ids |
//! | `nodes:type:{type}` | set of ids with that type |
//! | `nodes:status:{status}` | set of ids with that status |
//! | `nodes:events` | append-only event stream |
//!
//! Type and status are encoded as their integer codings, not names.

use nodewatch_types::{NodeStatus, NodeType};

/// Set of all node ids.
pub const ALL_NODES_KEY: &str = "nodes:all";

/// Append-only event stream.
pub const EVENTS_KEY: &str = "nodes:events";

/// Record hash for one node.
pub fn node_key(id: &str) -> String {
    format!("node:{id}")
}

/// Uniqueness key for `(type, name)`; the value is the node id.
pub fn byname_key(node_type: NodeType, name: &str) -> String {
    format!("node:byname:{}:{}", node_type.code(), name)
}

/// Membership set for one node type.
pub fn type_set_key(node_type: NodeType) -> String {
    format!("nodes:type:{}", node_type.code())
}

/// Membership set for one status.
pub fn status_set_key(status: NodeStatus) -> String {
    format!("nodes:status:{}", status.code())
}
