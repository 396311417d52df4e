//! gRPC service implementations.
//!
//! The surface is split in two:
//! - [`NodeWriteServiceImpl`] — the four mutating RPCs, served behind
//!   the bearer-token interceptor;
//! - [`NodeReadServiceImpl`] — get/list plus the WatchEvents stream,
//!   served without authentication.
//!
//! Both validate arguments before touching the store, map store errors
//! to gRPC status codes at this boundary, and publish to the broker
//! only after the store has committed.

mod read;
mod write;

use nodewatch_proto::convert::{event_kind_to_proto, node_to_proto};
use nodewatch_proto::proto::WatchEventsResponse;
use nodewatch_store::StoreError;
use nodewatch_types::{EventId, EventKind, Node};
use tonic::Status;

pub use read::NodeReadServiceImpl;
pub use write::NodeWriteServiceImpl;

/// Maps a store error onto the client-facing taxonomy.
pub(crate) fn store_status(err: StoreError) -> Status {
    match err {
        StoreError::AlreadyExists { .. } => Status::already_exists(err.to_string()),
        StoreError::NotFound { .. } => Status::not_found(err.to_string()),
        other => Status::internal(other.to_string()),
    }
}

/// Builds the watch message for one committed mutation.
pub(crate) fn watch_response(
    kind: EventKind,
    node: &Node,
    changed_fields: Vec<String>,
    sequence: EventId,
) -> WatchEventsResponse {
    WatchEventsResponse {
        event_type: event_kind_to_proto(kind),
        node: Some(node_to_proto(node)),
        changed_fields,
        sequence: sequence.to_string(),
    }
}
