//! Node record definitions.
//!
//! A [`Node`] is one tracked infrastructure entity (bare-metal host,
//! virtual machine, or container). The integer codings on [`NodeType`]
//! and [`NodeStatus`] are shared by the persisted layout and the wire
//! surface and must not be renumbered.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of infrastructure entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    /// Physical machine.
    Baremetal,
    /// Virtual machine.
    Vm,
    /// Container workload.
    Container,
}

impl NodeType {
    /// Integer coding used in index keys and on the wire.
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            NodeType::Baremetal => 1,
            NodeType::Vm => 2,
            NodeType::Container => 3,
        }
    }

    /// Decodes the integer coding. Returns `None` for the unspecified
    /// sentinel (0) and unknown values.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(NodeType::Baremetal),
            2 => Some(NodeType::Vm),
            3 => Some(NodeType::Container),
            _ => None,
        }
    }

    /// Lowercase name for log lines.
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeType::Baremetal => "baremetal",
            NodeType::Vm => "vm",
            NodeType::Container => "container",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last reported operational state of a node.
///
/// All transitions between statuses are allowed; the service does not
/// validate progressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeStatus {
    /// No status has been reported yet.
    Unknown,
    /// Node is serving.
    Up,
    /// Node is unreachable.
    Down,
    /// Node is serving but impaired.
    Degraded,
}

impl NodeStatus {
    /// Integer coding used in index keys and on the wire.
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            NodeStatus::Unknown => 1,
            NodeStatus::Up => 2,
            NodeStatus::Down => 3,
            NodeStatus::Degraded => 4,
        }
    }

    /// Decodes the integer coding. Returns `None` for the unspecified
    /// sentinel (0) and unknown values.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(NodeStatus::Unknown),
            2 => Some(NodeStatus::Up),
            3 => Some(NodeStatus::Down),
            4 => Some(NodeStatus::Degraded),
            _ => None,
        }
    }

    /// Lowercase name for log lines.
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Unknown => "unknown",
            NodeStatus::Up => "up",
            NodeStatus::Down => "down",
            NodeStatus::Degraded => "degraded",
        }
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Unknown
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked infrastructure entity.
///
/// `(node_type, name)` is a unique key. `labels` uses a `BTreeMap` so
/// equality (and therefore changed-field detection) has set semantics
/// independent of insertion order. `metadata_json` is an opaque JSON
/// text blob the service never parses; it is compared as a plain string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque identifier, stable for the node's lifetime.
    pub id: String,
    /// Entity kind; part of the unique key.
    pub node_type: NodeType,
    /// Human-readable name, unique within its type.
    pub name: String,
    /// Last reported operational state.
    pub status: NodeStatus,
    /// Free-form string labels.
    pub labels: BTreeMap<String, String>,
    /// Opaque JSON text; never parsed by the service.
    pub metadata_json: String,
    /// Re-stamped on every successful mutation.
    pub last_seen: DateTime<Utc>,
}

impl Node {
    /// Field names that differ between `self` and `other`, in the fixed
    /// order `name`, `type`, `status`, `labels`, `metadata_json`.
    ///
    /// `last_seen` and `id` never appear: the stamp changes on every
    /// mutation and the id is immutable.
    pub fn changed_fields(&self, other: &Node) -> Vec<String> {
        let mut fields = Vec::new();
        if self.name != other.name {
            fields.push("name".to_string());
        }
        if self.node_type != other.node_type {
            fields.push("type".to_string());
        }
        if self.status != other.status {
            fields.push("status".to_string());
        }
        if self.labels != other.labels {
            fields.push("labels".to_string());
        }
        if self.metadata_json != other.metadata_json {
            fields.push("metadata_json".to_string());
        }
        fields
    }
}

/// A node as submitted to create: id and status may still be absent.
///
/// The store fills the gaps — a fresh UUID for the id, [`NodeStatus::Unknown`]
/// for the status — and stamps `last_seen` at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    /// Caller-supplied id, or `None` to have one generated.
    pub id: Option<String>,
    /// Entity kind (required; the unspecified sentinel is rejected upstream).
    pub node_type: NodeType,
    /// Human-readable name (required non-empty, validated upstream).
    pub name: String,
    /// Initial status, or `None` to default to unknown.
    pub status: Option<NodeStatus>,
    /// Free-form string labels.
    pub labels: BTreeMap<String, String>,
    /// Opaque JSON text.
    pub metadata_json: String,
}
