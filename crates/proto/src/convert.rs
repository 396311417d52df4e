//! Conversions between domain and protobuf types.
//!
//! Proto enums travel as `i32` with a zero UNSPECIFIED sentinel; the
//! domain enums have no such sentinel, so the proto → domain direction
//! is fallible. The integer codings on the domain enums are identical
//! to the proto values, which the tests pin.

use chrono::{DateTime, TimeZone, Utc};
use nodewatch_types::{EventKind, Node, NodeDraft, NodeStatus, NodeType};
use snafu::Snafu;

use crate::proto;

/// Error converting a proto message into its domain counterpart.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ConvertError {
    /// The node type field was left at the zero sentinel.
    #[snafu(display("node type is required"))]
    UnspecifiedNodeType,

    /// The node type field carried an unknown value.
    #[snafu(display("invalid node type: {code}"))]
    InvalidNodeType {
        /// The rejected wire value.
        code: i32,
    },

    /// The status field was left at the zero sentinel where a concrete
    /// status is required.
    #[snafu(display("node status is required"))]
    UnspecifiedNodeStatus,

    /// The status field carried an unknown value.
    #[snafu(display("invalid node status: {code}"))]
    InvalidNodeStatus {
        /// The rejected wire value.
        code: i32,
    },
}

/// Decodes a wire node type, rejecting the sentinel and unknown values.
pub fn node_type_from_proto(code: i32) -> Result<NodeType, ConvertError> {
    if code == 0 {
        return Err(ConvertError::UnspecifiedNodeType);
    }
    NodeType::from_code(code).ok_or(ConvertError::InvalidNodeType { code })
}

/// Decodes a wire status, rejecting the sentinel and unknown values.
pub fn node_status_from_proto(code: i32) -> Result<NodeStatus, ConvertError> {
    if code == 0 {
        return Err(ConvertError::UnspecifiedNodeStatus);
    }
    NodeStatus::from_code(code).ok_or(ConvertError::InvalidNodeStatus { code })
}

/// Converts a domain node to its wire form.
pub fn node_to_proto(node: &Node) -> proto::Node {
    proto::Node {
        id: node.id.clone(),
        r#type: node.node_type.code(),
        name: node.name.clone(),
        status: node.status.code(),
        labels: node.labels.clone().into_iter().collect(),
        metadata_json: node.metadata_json.clone(),
        last_seen: Some(datetime_to_timestamp(node.last_seen)),
    }
}

/// Converts a wire node into a create draft.
///
/// Empty id and the status sentinel mean "absent" here — the store
/// fills both in. The type must be concrete.
///
/// # Errors
///
/// Returns a `ConvertError` for an unspecified/unknown type or an
/// unknown (non-zero) status value.
pub fn draft_from_proto(node: proto::Node) -> Result<NodeDraft, ConvertError> {
    let node_type = node_type_from_proto(node.r#type)?;
    let status = if node.status == 0 {
        None
    } else {
        Some(node_status_from_proto(node.status)?)
    };

    Ok(NodeDraft {
        id: if node.id.is_empty() { None } else { Some(node.id) },
        node_type,
        name: node.name,
        status,
        labels: node.labels.into_iter().collect(),
        metadata_json: node.metadata_json,
    })
}

/// Converts a wire node into a full domain node (update path).
///
/// Both type and status must be concrete: silently keeping or
/// overwriting state on a zero sentinel would corrupt the type/status
/// indexes. `last_seen` is carried as-is when present (the store
/// re-stamps it at commit time anyway).
///
/// # Errors
///
/// Returns a `ConvertError` when type or status is unspecified or
/// unknown.
pub fn node_from_proto(node: proto::Node) -> Result<Node, ConvertError> {
    let node_type = node_type_from_proto(node.r#type)?;
    let status = node_status_from_proto(node.status)?;

    Ok(Node {
        id: node.id,
        node_type,
        name: node.name,
        status,
        labels: node.labels.into_iter().collect(),
        metadata_json: node.metadata_json,
        last_seen: node
            .last_seen
            .map(timestamp_to_datetime)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    })
}

/// Wire code for an event kind.
pub fn event_kind_to_proto(kind: EventKind) -> i32 {
    kind.code()
}

/// Converts a chrono timestamp to the protobuf well-known type.
pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

/// Converts a protobuf timestamp to chrono, clamping out-of-range
/// values to the epoch.
pub fn timestamp_to_datetime(ts: prost_types::Timestamp) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.seconds, ts.nanos.max(0) as u32)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
