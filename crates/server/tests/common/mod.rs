//! Test harness for service integration tests.
//!
//! Assembles the full service stack — store, broker, write service,
//! read service — over the in-memory backend, the same wiring
//! `NodeWatchServer::serve` performs minus the transport.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::sync::Arc;

use nodewatch_proto::proto;
use nodewatch_proto::proto::node_write_service_server::NodeWriteService;
use nodewatch_server::EventBroker;
use nodewatch_server::services::{NodeReadServiceImpl, NodeWriteServiceImpl};
use nodewatch_store::{MemoryBackend, NodeStore};
use tonic::Request;

/// One assembled service stack over a fresh in-memory backend.
pub struct TestStack {
    /// Direct store handle, for mutations that bypass the services.
    pub store: NodeStore<MemoryBackend>,
    /// The shared broker.
    pub broker: Arc<EventBroker>,
    /// The mutating service (auth is exercised separately on the
    /// interceptor; handlers are called directly here).
    pub write: NodeWriteServiceImpl<MemoryBackend>,
    /// The read+watch service.
    pub read: NodeReadServiceImpl<MemoryBackend>,
}

impl TestStack {
    /// Builds a fresh stack.
    pub fn new() -> Self {
        let store = NodeStore::new(MemoryBackend::new());
        let broker = Arc::new(EventBroker::new());
        let write = NodeWriteServiceImpl::builder()
            .store(store.clone())
            .broker(broker.clone())
            .build();
        let read = NodeReadServiceImpl::builder()
            .store(store.clone())
            .broker(broker.clone())
            .build();
        Self { store, broker, write, read }
    }

    /// Creates a node through the write service and returns the
    /// response snapshot.
    pub async fn create_node(&self, node: proto::Node) -> proto::Node {
        self.write
            .create_node(Request::new(proto::CreateNodeRequest { node: Some(node) }))
            .await
            .expect("create node")
            .into_inner()
            .node
            .expect("node in response")
    }
}

/// A minimal proto node with the given type and name.
pub fn proto_node(node_type: proto::NodeType, name: &str) -> proto::Node {
    proto::Node {
        r#type: node_type as i32,
        name: name.to_string(),
        ..Default::default()
    }
}
