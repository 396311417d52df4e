//! Read and watch RPC implementations.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use nodewatch_proto::convert::{self, node_to_proto};
use nodewatch_proto::proto;
use nodewatch_proto::proto::node_read_service_server::NodeReadService;
use nodewatch_proto::proto::{
    GetNodeRequest, GetNodeResponse, ListNodesRequest, ListNodesResponse, WatchEventsRequest,
    WatchEventsResponse,
};
use nodewatch_store::{KvBackend, NodeStore};
use nodewatch_types::{EventId, EventKind, EventRecord};
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store_status;
use crate::broker::{EventBroker, Subscription};
use crate::pagination::{self, PageTokenCodec};

/// Page size when the request leaves it at zero.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Hard cap on the page size.
const MAX_PAGE_SIZE: usize = 1000;

/// Cadence of the per-watcher durable-log poll.
const BRIDGE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Get/list plus the WatchEvents stream. Unauthenticated.
#[derive(bon::Builder)]
pub struct NodeReadServiceImpl<B: KvBackend + Clone> {
    /// Authoritative persistence.
    store: NodeStore<B>,
    /// Live fan-out the watch engine subscribes to.
    broker: Arc<EventBroker>,
    /// Codec for opaque list page tokens.
    #[builder(default = PageTokenCodec::with_random_key())]
    page_tokens: PageTokenCodec,
}

#[tonic::async_trait]
impl<B: KvBackend + Clone> NodeReadService for NodeReadServiceImpl<B> {
    async fn get_node(
        &self,
        request: Request<GetNodeRequest>,
    ) -> Result<Response<GetNodeResponse>, Status> {
        let req = request.into_inner();
        if req.id.is_empty() {
            return Err(Status::invalid_argument("node id is required"));
        }

        let node = self.store.get(&req.id).await.map_err(store_status)?;
        Ok(Response::new(GetNodeResponse { node: Some(node_to_proto(&node)) }))
    }

    async fn list_nodes(
        &self,
        request: Request<ListNodesRequest>,
    ) -> Result<Response<ListNodesResponse>, Status> {
        let req = request.into_inner();

        let page_size = if req.page_size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            (req.page_size as usize).min(MAX_PAGE_SIZE)
        };

        let type_filter = match req.type_filter {
            0 => None,
            code => Some(
                convert::node_type_from_proto(code)
                    .map_err(|e| Status::invalid_argument(format!("type_filter: {e}")))?,
            ),
        };
        let status_filter = match req.status_filter {
            0 => None,
            code => Some(
                convert::node_status_from_proto(code)
                    .map_err(|e| Status::invalid_argument(format!("status_filter: {e}")))?,
            ),
        };

        let filter_hash = pagination::filter_hash(req.type_filter, req.status_filter);
        let offset = if req.page_token.is_empty() {
            0
        } else {
            let token = self
                .page_tokens
                .decode(&req.page_token)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;
            self.page_tokens
                .validate_filters(&token, filter_hash)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;
            token.offset as usize
        };

        let page = self
            .store
            .list(type_filter, status_filter, offset, page_size)
            .await
            .map_err(store_status)?;

        let next_page_token = page
            .next_offset
            .map(|next| self.page_tokens.mint(next, filter_hash))
            .unwrap_or_default();

        info!(
            service = "NodeReadService",
            method = "ListNodes",
            returned = page.nodes.len(),
            has_more = !next_page_token.is_empty(),
            "nodes listed"
        );

        Ok(Response::new(ListNodesResponse {
            nodes: page.nodes.iter().map(node_to_proto).collect(),
            next_page_token,
        }))
    }

    type WatchEventsStream =
        Pin<Box<dyn Stream<Item = Result<WatchEventsResponse, Status>> + Send + 'static>>;

    /// Opens a watch stream.
    ///
    /// The watcher joins at "now": the bridge cursor is read before the
    /// broker subscription is created, so any event landing in the gap
    /// is recovered from the log on the first bridge tick. Events
    /// dropped later by a full buffer are recovered the same way;
    /// duplicates across the two paths share a sequence.
    async fn watch_events(
        &self,
        _request: Request<WatchEventsRequest>,
    ) -> Result<Response<Self::WatchEventsStream>, Status> {
        let subscriber_id = Uuid::new_v4().to_string();

        let cursor = self.store.latest_sequence().await.map_err(store_status)?;
        let subscription = self.broker.subscribe(&subscriber_id);

        info!(
            service = "NodeReadService",
            method = "WatchEvents",
            subscriber_id = %subscriber_id,
            watchers = self.broker.subscriber_count(),
            "watcher subscribed"
        );

        tokio::spawn(run_bridge(
            self.store.clone(),
            Arc::clone(&self.broker),
            subscriber_id,
            cursor,
        ));

        let stream = WatchStream { subscription, broker: Arc::clone(&self.broker) };
        Ok(Response::new(Box::pin(stream)))
    }
}

/// Response stream for one watcher; owns the broker subscription.
///
/// Dropping the stream (client disconnect, server shutdown) removes
/// the subscription; the bridge task notices on its next tick and
/// exits.
struct WatchStream {
    subscription: Subscription,
    broker: Arc<EventBroker>,
}

impl Stream for WatchStream {
    type Item = Result<WatchEventsResponse, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.subscription.poll_recv(cx).map(|event| event.map(Ok))
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.broker.unsubscribe(self.subscription.id());
        debug!(subscriber_id = %self.subscription.id(), "watcher unsubscribed");
    }
}

/// Per-watcher bridge between the durable log and the broker.
///
/// Polls the log at a fixed cadence from the watcher's cursor and
/// republishes everything found, re-fetching the current snapshot for
/// non-deleted events. A transient tail failure is retried on the next
/// tick without moving the cursor.
async fn run_bridge<B: KvBackend + Clone>(
    store: NodeStore<B>,
    broker: Arc<EventBroker>,
    subscriber_id: String,
    mut cursor: Option<EventId>,
) {
    let mut ticker = tokio::time::interval(BRIDGE_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        if !broker.is_subscribed(&subscriber_id) {
            break;
        }

        let events = match store.tail_events(cursor).await {
            Ok(events) => events,
            Err(err) => {
                warn!(
                    subscriber_id = %subscriber_id,
                    error = %err,
                    "event log tail failed, will retry"
                );
                continue;
            },
        };

        for event in events {
            cursor = Some(event.id);
            if let Some(message) = bridge_message(&store, &event).await {
                broker.publish(&message);
            }
        }
    }

    debug!(subscriber_id = %subscriber_id, "watch bridge stopped");
}

/// Builds the mirror message for one log entry.
///
/// Deleted entries carry an id-only snapshot (the log keeps no record
/// body); for everything else the current record is re-fetched, and a
/// node that vanished in the meantime is skipped — its deletion entry
/// follows in the same or a later batch.
async fn bridge_message<B: KvBackend + Clone>(
    store: &NodeStore<B>,
    event: &EventRecord,
) -> Option<WatchEventsResponse> {
    let node = match event.kind {
        EventKind::Deleted => proto::Node { id: event.node_id.clone(), ..Default::default() },
        _ => match store.get(&event.node_id).await {
            Ok(node) => node_to_proto(&node),
            Err(_) => return None,
        },
    };

    Some(WatchEventsResponse {
        event_type: event.kind.code(),
        node: Some(node),
        changed_fields: event.changed_fields.clone(),
        sequence: event.id.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::collections::BTreeMap;

    use futures::StreamExt;
    use nodewatch_store::MemoryBackend;
    use nodewatch_types::{NodeDraft, NodeStatus, NodeType};
    use tonic::Code;

    use super::*;

    fn make_service() -> (NodeReadServiceImpl<MemoryBackend>, NodeStore<MemoryBackend>, Arc<EventBroker>)
    {
        let store = NodeStore::new(MemoryBackend::new());
        let broker = Arc::new(EventBroker::new());
        let service = NodeReadServiceImpl::builder()
            .store(store.clone())
            .broker(broker.clone())
            .build();
        (service, store, broker)
    }

    fn make_draft(node_type: NodeType, name: &str) -> NodeDraft {
        NodeDraft {
            id: None,
            node_type,
            name: name.to_string(),
            status: None,
            labels: BTreeMap::new(),
            metadata_json: String::new(),
        }
    }

    fn list_request(page_size: i32, page_token: &str) -> Request<ListNodesRequest> {
        Request::new(ListNodesRequest {
            page_size,
            page_token: page_token.to_string(),
            type_filter: 0,
            status_filter: 0,
        })
    }

    #[tokio::test]
    async fn get_node_requires_id_and_maps_not_found() {
        let (service, _, _) = make_service();

        let err = service
            .get_node(Request::new(GetNodeRequest { id: String::new() }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = service
            .get_node(Request::new(GetNodeRequest { id: "ghost".to_string() }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn get_node_returns_the_record() {
        let (service, store, _) = make_service();
        let (node, _) = store.create(make_draft(NodeType::Vm, "web-01")).await.expect("create");

        let resp = service
            .get_node(Request::new(GetNodeRequest { id: node.id.clone() }))
            .await
            .expect("get");
        let got = resp.into_inner().node.expect("node");
        assert_eq!(got.id, node.id);
        assert_eq!(got.name, "web-01");
    }

    #[tokio::test]
    async fn list_pages_through_opaque_tokens() {
        let (service, store, _) = make_service();
        for i in 0..5 {
            store.create(make_draft(NodeType::Vm, &format!("n-{i}"))).await.expect("create");
        }

        let mut seen = Vec::new();
        let mut token = String::new();
        loop {
            let resp = service
                .list_nodes(list_request(2, &token))
                .await
                .expect("list")
                .into_inner();
            seen.extend(resp.nodes.into_iter().map(|n| n.id));
            if resp.next_page_token.is_empty() {
                break;
            }
            token = resp.next_page_token;
        }

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5, "all nodes, no duplicates");
    }

    #[tokio::test]
    async fn list_rejects_foreign_and_mismatched_tokens() {
        let (service, store, _) = make_service();
        for i in 0..3 {
            store.create(make_draft(NodeType::Vm, &format!("n-{i}"))).await.expect("create");
        }

        let err = service
            .list_nodes(list_request(2, "garbage-token"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        // Token minted for an unfiltered listing, replayed with a filter
        let resp = service.list_nodes(list_request(2, "")).await.expect("list").into_inner();
        assert!(!resp.next_page_token.is_empty());

        let err = service
            .list_nodes(Request::new(ListNodesRequest {
                page_size: 2,
                page_token: resp.next_page_token,
                type_filter: proto::NodeType::Vm as i32,
                status_filter: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn list_rejects_unknown_filter_codes() {
        let (service, _, _) = make_service();
        let err = service
            .list_nodes(Request::new(ListNodesRequest {
                page_size: 0,
                page_token: String::new(),
                type_filter: 99,
                status_filter: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn list_filters_by_type() {
        let (service, store, _) = make_service();
        store.create(make_draft(NodeType::Vm, "vm-1")).await.expect("create");
        store.create(make_draft(NodeType::Baremetal, "bm-1")).await.expect("create");

        let resp = service
            .list_nodes(Request::new(ListNodesRequest {
                page_size: 0,
                page_token: String::new(),
                type_filter: proto::NodeType::Vm as i32,
                status_filter: 0,
            }))
            .await
            .expect("list")
            .into_inner();
        assert_eq!(resp.nodes.len(), 1);
        assert_eq!(resp.nodes[0].name, "vm-1");
    }

    #[tokio::test]
    async fn watch_stream_receives_live_events() {
        let (service, _, broker) = make_service();
        let mut stream = service
            .watch_events(Request::new(WatchEventsRequest {}))
            .await
            .expect("watch")
            .into_inner();
        assert_eq!(broker.subscriber_count(), 1);

        broker.publish(&WatchEventsResponse {
            event_type: proto::EventType::Created as i32,
            node: None,
            changed_fields: Vec::new(),
            sequence: "0-1".to_string(),
        });

        let event = stream.next().await.expect("item").expect("ok");
        assert_eq!(event.sequence, "0-1");
    }

    #[tokio::test]
    async fn dropping_the_stream_unsubscribes() {
        let (service, _, broker) = make_service();
        let stream = service
            .watch_events(Request::new(WatchEventsRequest {}))
            .await
            .expect("watch")
            .into_inner();
        assert_eq!(broker.subscriber_count(), 1);

        drop(stream);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bridge_recovers_events_missing_from_the_live_path() {
        let (service, store, _) = make_service();
        let mut stream = service
            .watch_events(Request::new(WatchEventsRequest {}))
            .await
            .expect("watch")
            .into_inner();

        // Mutate the store directly: nothing reaches the broker's live
        // path, as if the publish had been dropped.
        let (node, _) = store.create(make_draft(NodeType::Vm, "web-01")).await.expect("create");

        let event = stream.next().await.expect("item").expect("ok");
        assert_eq!(event.event_type, proto::EventType::Created as i32);
        assert_eq!(event.node.expect("snapshot").id, node.id);
    }

    #[tokio::test(start_paused = true)]
    async fn bridge_mirrors_deletions_with_id_only_snapshots() {
        let (service, store, _) = make_service();
        let mut stream = service
            .watch_events(Request::new(WatchEventsRequest {}))
            .await
            .expect("watch")
            .into_inner();

        let (node, _) = store.create(make_draft(NodeType::Vm, "web-01")).await.expect("create");
        store.delete(&node.id).await.expect("delete");

        // The created entry's record is already gone, so the bridge
        // skips it and mirrors only the deletion.
        let event = stream.next().await.expect("item").expect("ok");
        assert_eq!(event.event_type, proto::EventType::Deleted as i32);
        let snapshot = event.node.expect("snapshot");
        assert_eq!(snapshot.id, node.id);
        assert!(snapshot.name.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_joins_at_now_without_history_replay() {
        let (service, store, _) = make_service();
        store.create(make_draft(NodeType::Vm, "old-1")).await.expect("create");
        store.create(make_draft(NodeType::Vm, "old-2")).await.expect("create");

        let mut stream = service
            .watch_events(Request::new(WatchEventsRequest {}))
            .await
            .expect("watch")
            .into_inner();

        // Only events appended after subscription may arrive
        let (fresh, _) = store.create(make_draft(NodeType::Vm, "fresh")).await.expect("create");
        let event = stream.next().await.expect("item").expect("ok");
        assert_eq!(event.node.expect("snapshot").id, fresh.id);

        let more = store.update_status(&fresh.id, NodeStatus::Up).await.expect("status");
        assert!(more.1.is_some());
        let event = stream.next().await.expect("item").expect("ok");
        assert_eq!(event.event_type, proto::EventType::Updated as i32);
        assert_eq!(event.changed_fields, vec!["status"]);
    }
}
