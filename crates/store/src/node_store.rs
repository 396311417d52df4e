//! Node record store.
//!
//! [`NodeStore`] owns the persisted layout described in [`crate::keys`]:
//! the record hash, the `(type, name)` uniqueness key, the all/type/
//! status membership sets, and the append-only event stream. Every
//! mutating operation commits its record write, index updates, and
//! event append as one [`WriteBatch`], so no observer can see a record
//! without its indexes or a mutation without its event.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use nodewatch_types::{EventId, EventKind, EventRecord, Node, NodeDraft, NodeStatus, NodeType};
use uuid::Uuid;

use crate::backend::{KvBackend, RawEvent, WriteBatch};
use crate::error::{BackendSnafu, Result, StoreError};
use crate::keys;

/// Hard cap on a single list page.
const MAX_LIST_LIMIT: usize = 1000;

/// Maximum event-log entries read per tail call. The original stream
/// consumer read in batches of this size; one bridge tick does too.
pub const TAIL_BATCH_LIMIT: usize = 100;

/// One page of list results.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    /// Nodes in the page, in the underlying set's enumeration order.
    pub nodes: Vec<Node>,
    /// Offset to pass for the next page; set when this page was full.
    pub next_offset: Option<u64>,
}

/// Authoritative persistence for nodes, indexes, and the event log.
///
/// Cheap to clone when the backend is; clones share the backend.
#[derive(Debug, Clone)]
pub struct NodeStore<B> {
    backend: B,
}

impl<B: KvBackend> NodeStore<B> {
    /// Wraps a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Round-trips the backend; used by the readiness probe at startup.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the engine is unreachable.
    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    /// Creates a node.
    ///
    /// Fills the draft's gaps (UUID id, unknown status), stamps
    /// `last_seen`, claims the `(type, name)` key, and commits record +
    /// indexes + CREATED event in one batch. A claim that loses returns
    /// `AlreadyExists` with no side effects.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` on a `(type, name)`
    /// collision, `StoreError::Backend` on engine failure.
    pub async fn create(&self, draft: NodeDraft) -> Result<(Node, EventId)> {
        let node = Node {
            id: draft.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            node_type: draft.node_type,
            name: draft.name,
            status: draft.status.unwrap_or_default(),
            labels: draft.labels,
            metadata_json: draft.metadata_json,
            last_seen: now_stamp(),
        };

        // The uniqueness claim is ordered before everything else: a
        // losing concurrent create fails here without side effects.
        let claimed = self
            .backend
            .string_set_nx(&keys::byname_key(node.node_type, &node.name), &node.id)
            .await?;
        if !claimed {
            return Err(StoreError::AlreadyExists {
                node_type: node.node_type,
                name: node.name,
            });
        }

        let batch = WriteBatch::new()
            .hash_set(keys::node_key(&node.id), record_fields(&node))
            .set_add(keys::ALL_NODES_KEY, &node.id)
            .set_add(keys::type_set_key(node.node_type), &node.id)
            .set_add(keys::status_set_key(node.status), &node.id)
            .append_event(event_fields(EventKind::Created, &node.id, &[]));

        let sequence = self.commit_with_event(batch).await?;
        Ok((node, sequence))
    }

    /// Updates a node in full.
    ///
    /// Old index memberships (byname key, type set, status set) are
    /// queued for removal before the new record and memberships are
    /// written, so a type or status change leaves nothing behind. The
    /// UPDATED event is appended even when no field differs — an
    /// idempotent update still touches `last_seen`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the id is absent,
    /// `StoreError::Backend` on engine failure.
    pub async fn update(&self, node: Node) -> Result<(Node, Vec<String>, EventId)> {
        let old = self.get(&node.id).await?;

        let mut updated = node;
        updated.last_seen = now_stamp().max(old.last_seen);
        let changed_fields = old.changed_fields(&updated);

        let batch = WriteBatch::new()
            .delete(keys::byname_key(old.node_type, &old.name))
            .set_remove(keys::type_set_key(old.node_type), &old.id)
            .set_remove(keys::status_set_key(old.status), &old.id)
            .hash_set(keys::node_key(&updated.id), record_fields(&updated))
            .string_set(keys::byname_key(updated.node_type, &updated.name), &updated.id)
            .set_add(keys::ALL_NODES_KEY, &updated.id)
            .set_add(keys::type_set_key(updated.node_type), &updated.id)
            .set_add(keys::status_set_key(updated.status), &updated.id)
            .append_event(event_fields(EventKind::Updated, &updated.id, &changed_fields));

        let sequence = self.commit_with_event(batch).await?;
        Ok((updated, changed_fields, sequence))
    }

    /// Updates only the status.
    ///
    /// Short-circuits when the status already matches: the `last_seen`
    /// stamp is persisted but no event is emitted (`None`). Otherwise
    /// the status membership moves and an UPDATED event with
    /// `changed_fields = ["status"]` is appended.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the id is absent,
    /// `StoreError::Backend` on engine failure.
    pub async fn update_status(
        &self,
        id: &str,
        status: NodeStatus,
    ) -> Result<(Node, Option<EventId>)> {
        let old = self.get(id).await?;
        let stamp = now_stamp().max(old.last_seen);

        if old.status == status {
            let batch = WriteBatch::new().hash_set(
                keys::node_key(id),
                vec![("last_seen".to_string(), format_ts(stamp))],
            );
            self.backend.commit(batch).await?;
            return Ok((Node { last_seen: stamp, ..old }, None));
        }

        let updated = Node { status, last_seen: stamp, ..old };
        let batch = WriteBatch::new()
            .set_remove(keys::status_set_key(old.status), id)
            .hash_set(
                keys::node_key(id),
                vec![
                    ("status".to_string(), status.code().to_string()),
                    ("last_seen".to_string(), format_ts(stamp)),
                ],
            )
            .set_add(keys::status_set_key(status), id)
            .append_event(event_fields(EventKind::Updated, id, &["status".to_string()]));

        let sequence = self.commit_with_event(batch).await?;
        Ok((updated, Some(sequence)))
    }

    /// Deletes a node, removing it from every index, and appends the
    /// DELETED event. Returns the pre-deletion snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the id is absent,
    /// `StoreError::Backend` on engine failure.
    pub async fn delete(&self, id: &str) -> Result<(Node, EventId)> {
        let node = self.get(id).await?;

        let batch = WriteBatch::new()
            .delete(keys::byname_key(node.node_type, &node.name))
            .set_remove(keys::type_set_key(node.node_type), id)
            .set_remove(keys::status_set_key(node.status), id)
            .set_remove(keys::ALL_NODES_KEY, id)
            .delete(keys::node_key(id))
            .append_event(event_fields(EventKind::Deleted, id, &[]));

        let sequence = self.commit_with_event(batch).await?;
        Ok((node, sequence))
    }

    /// Reads one node.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the id is absent,
    /// `StoreError::Corrupt` if the record does not decode,
    /// `StoreError::Backend` on engine failure.
    pub async fn get(&self, id: &str) -> Result<Node> {
        let key = keys::node_key(id);
        let fields = self.backend.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        decode_node(&key, &fields)
    }

    /// Lists nodes, optionally filtered by type and/or status.
    ///
    /// Both filters select the intersection of the two index sets; one
    /// filter selects that index; none selects the "all" set. The
    /// enumeration order of the underlying set is surfaced unchanged
    /// and is not specified. `limit == 0` means unbounded; larger
    /// limits are capped at 1000. Ids whose record vanished between
    /// the set read and the record read are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    pub async fn list(
        &self,
        type_filter: Option<NodeType>,
        status_filter: Option<NodeStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<ListPage> {
        let limited = limit != 0;
        let limit = effective_limit(limit);

        let ids = match (type_filter, status_filter) {
            (Some(t), Some(s)) => {
                self.backend
                    .set_intersect(&keys::type_set_key(t), &keys::status_set_key(s))
                    .await?
            },
            (Some(t), None) => self.backend.set_members(&keys::type_set_key(t)).await?,
            (None, Some(s)) => self.backend.set_members(&keys::status_set_key(s)).await?,
            (None, None) => self.backend.set_members(keys::ALL_NODES_KEY).await?,
        };

        if offset >= ids.len() {
            return Ok(ListPage { nodes: Vec::new(), next_offset: None });
        }

        let end = ids.len().min(offset.saturating_add(limit));
        let mut nodes = Vec::with_capacity(end - offset);
        for id in &ids[offset..end] {
            match self.get(id).await {
                Ok(node) => nodes.push(node),
                // Deleted between the set read and the record read
                Err(StoreError::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }

        let next_offset = if limited && nodes.len() == limit {
            Some((offset + limit) as u64)
        } else {
            None
        };

        Ok(ListPage { nodes, next_offset })
    }

    /// Reads event-log entries strictly after `after` (or from the
    /// start when `None`), at most [`TAIL_BATCH_LIMIT`] per call.
    /// Undecodable entries are skipped with a warning, matching the
    /// log's append-only tolerance for foreign entries.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    pub async fn tail_events(&self, after: Option<EventId>) -> Result<Vec<EventRecord>> {
        let raw = self.backend.events_after(after, TAIL_BATCH_LIMIT).await?;
        let mut events = Vec::with_capacity(raw.len());
        for entry in raw {
            match decode_event(&entry) {
                Ok(event) => events.push(event),
                Err(err) => {
                    tracing::warn!(id = %entry.id, error = %err, "skipping undecodable event entry");
                },
            }
        }
        Ok(events)
    }

    /// Current tail of the event log; the "join at now" cursor for
    /// fresh watchers.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on engine failure.
    pub async fn latest_sequence(&self) -> Result<Option<EventId>> {
        self.backend.last_event_id().await
    }

    async fn commit_with_event(&self, batch: WriteBatch) -> Result<EventId> {
        self.backend.commit(batch).await?.ok_or_else(|| {
            BackendSnafu { message: "batch with event append returned no sequence" }.build()
        })
    }
}

/// Caps a list limit; 0 means unbounded.
fn effective_limit(limit: usize) -> usize {
    if limit == 0 { usize::MAX } else { limit.min(MAX_LIST_LIMIT) }
}

/// Current time at the precision the record layout stores, so a
/// stamped value read back compares equal.
fn now_stamp() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Record hash fields for a node. Labels are stored as a JSON object,
/// metadata as the opaque text it arrived as.
fn record_fields(node: &Node) -> Vec<(String, String)> {
    let labels_json = serde_json::to_string(&node.labels).unwrap_or_else(|_| "{}".to_string());
    vec![
        ("id".to_string(), node.id.clone()),
        ("type".to_string(), node.node_type.code().to_string()),
        ("name".to_string(), node.name.clone()),
        ("status".to_string(), node.status.code().to_string()),
        ("last_seen".to_string(), format_ts(node.last_seen)),
        ("labels_json".to_string(), labels_json),
        ("metadata_json".to_string(), node.metadata_json.clone()),
    ]
}

/// Decodes a record hash. Strict on the enum codings (a bad coding
/// would make index membership unrepresentable); lenient on timestamp
/// and labels, which degrade to defaults.
fn decode_node(key: &str, fields: &HashMap<String, String>) -> Result<Node> {
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
    let corrupt = |message: String| StoreError::Corrupt { key: key.to_string(), message };

    let type_code = field("type")
        .parse::<i32>()
        .map_err(|_| corrupt(format!("non-numeric type {:?}", field("type"))))?;
    let node_type = NodeType::from_code(type_code)
        .ok_or_else(|| corrupt(format!("unknown type code {type_code}")))?;

    let status_code = field("status")
        .parse::<i32>()
        .map_err(|_| corrupt(format!("non-numeric status {:?}", field("status"))))?;
    let status = NodeStatus::from_code(status_code)
        .ok_or_else(|| corrupt(format!("unknown status code {status_code}")))?;

    let last_seen = DateTime::parse_from_rfc3339(&field("last_seen"))
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let labels = serde_json::from_str(&field("labels_json")).unwrap_or_default();

    Ok(Node {
        id: field("id"),
        node_type,
        name: field("name"),
        status,
        labels,
        metadata_json: field("metadata_json"),
        last_seen,
    })
}

/// Stream entry fields for an event append.
fn event_fields(kind: EventKind, node_id: &str, changed_fields: &[String]) -> Vec<(String, String)> {
    let changed_json =
        serde_json::to_string(changed_fields).unwrap_or_else(|_| "[]".to_string());
    vec![
        ("event_type".to_string(), kind.code().to_string()),
        ("node_id".to_string(), node_id.to_string()),
        ("changed_fields".to_string(), changed_json),
        ("ts".to_string(), Utc::now().timestamp().to_string()),
    ]
}

/// Decodes one stream entry.
fn decode_event(raw: &RawEvent) -> Result<EventRecord> {
    let field = |name: &str| raw.fields.get(name).cloned().unwrap_or_default();
    let corrupt = |message: String| StoreError::Corrupt {
        key: keys::EVENTS_KEY.to_string(),
        message,
    };

    let kind_code = field("event_type")
        .parse::<i32>()
        .map_err(|_| corrupt(format!("non-numeric event_type {:?}", field("event_type"))))?;
    let kind = EventKind::from_code(kind_code)
        .ok_or_else(|| corrupt(format!("unknown event_type code {kind_code}")))?;

    let node_id = field("node_id");
    if node_id.is_empty() {
        return Err(corrupt("entry without node_id".to_string()));
    }

    let changed_fields = serde_json::from_str(&field("changed_fields")).unwrap_or_default();
    let ts = field("ts")
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Ok(EventRecord { id: raw.id, kind, node_id, changed_fields, ts })
}
