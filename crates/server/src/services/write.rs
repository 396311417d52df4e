//! Mutating RPC implementations.

use std::sync::Arc;

use nodewatch_proto::convert::{self, node_to_proto};
use nodewatch_proto::proto::node_write_service_server::NodeWriteService;
use nodewatch_proto::proto::{
    CreateNodeRequest, CreateNodeResponse, DeleteNodeRequest, DeleteNodeResponse,
    UpdateNodeRequest, UpdateNodeResponse, UpdateStatusRequest, UpdateStatusResponse,
};
use nodewatch_store::{KvBackend, NodeStore};
use nodewatch_types::EventKind;
use tonic::{Request, Response, Status};
use tracing::info;

use super::{store_status, watch_response};
use crate::broker::EventBroker;

/// The four mutating RPCs. Argument validation precedes any store
/// call; the broker sees an event only after the store committed it.
#[derive(bon::Builder)]
pub struct NodeWriteServiceImpl<B: KvBackend + Clone> {
    /// Authoritative persistence.
    store: NodeStore<B>,
    /// Live fan-out for committed mutations.
    broker: Arc<EventBroker>,
}

#[tonic::async_trait]
impl<B: KvBackend + Clone> NodeWriteService for NodeWriteServiceImpl<B> {
    async fn create_node(
        &self,
        request: Request<CreateNodeRequest>,
    ) -> Result<Response<CreateNodeResponse>, Status> {
        let req = request.into_inner();
        let node = req.node.ok_or_else(|| Status::invalid_argument("node is required"))?;
        if node.name.is_empty() {
            return Err(Status::invalid_argument("node name is required"));
        }
        if node.r#type == 0 {
            return Err(Status::invalid_argument("node type is required"));
        }
        let draft =
            convert::draft_from_proto(node).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let (node, sequence) = self.store.create(draft).await.map_err(store_status)?;

        info!(
            service = "NodeWriteService",
            method = "CreateNode",
            id = %node.id,
            name = %node.name,
            node_type = %node.node_type,
            sequence = %sequence,
            "node created"
        );

        self.broker.publish(&watch_response(EventKind::Created, &node, Vec::new(), sequence));

        Ok(Response::new(CreateNodeResponse { node: Some(node_to_proto(&node)) }))
    }

    async fn update_node(
        &self,
        request: Request<UpdateNodeRequest>,
    ) -> Result<Response<UpdateNodeResponse>, Status> {
        let req = request.into_inner();
        let node = req.node.ok_or_else(|| Status::invalid_argument("node is required"))?;
        if node.id.is_empty() {
            return Err(Status::invalid_argument("node id is required"));
        }
        let node =
            convert::node_from_proto(node).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let (node, changed_fields, sequence) =
            self.store.update(node).await.map_err(store_status)?;

        info!(
            service = "NodeWriteService",
            method = "UpdateNode",
            id = %node.id,
            name = %node.name,
            changed = changed_fields.len(),
            sequence = %sequence,
            "node updated"
        );

        self.broker.publish(&watch_response(EventKind::Updated, &node, changed_fields, sequence));

        Ok(Response::new(UpdateNodeResponse { node: Some(node_to_proto(&node)) }))
    }

    async fn update_status(
        &self,
        request: Request<UpdateStatusRequest>,
    ) -> Result<Response<UpdateStatusResponse>, Status> {
        let req = request.into_inner();
        if req.id.is_empty() {
            return Err(Status::invalid_argument("node id is required"));
        }
        if req.status == 0 {
            return Err(Status::invalid_argument("status is required"));
        }
        let status = convert::node_status_from_proto(req.status)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let (node, sequence) =
            self.store.update_status(&req.id, status).await.map_err(store_status)?;

        info!(
            service = "NodeWriteService",
            method = "UpdateStatus",
            id = %node.id,
            status = %node.status,
            emitted = sequence.is_some(),
            "node status updated"
        );

        // The no-op path touches last_seen only and publishes nothing
        if let Some(sequence) = sequence {
            self.broker.publish(&watch_response(
                EventKind::Updated,
                &node,
                vec!["status".to_string()],
                sequence,
            ));
        }

        Ok(Response::new(UpdateStatusResponse { node: Some(node_to_proto(&node)) }))
    }

    async fn delete_node(
        &self,
        request: Request<DeleteNodeRequest>,
    ) -> Result<Response<DeleteNodeResponse>, Status> {
        let req = request.into_inner();
        if req.id.is_empty() {
            return Err(Status::invalid_argument("node id is required"));
        }

        let (snapshot, sequence) = self.store.delete(&req.id).await.map_err(store_status)?;

        info!(
            service = "NodeWriteService",
            method = "DeleteNode",
            id = %req.id,
            sequence = %sequence,
            "node deleted"
        );

        self.broker.publish(&watch_response(EventKind::Deleted, &snapshot, Vec::new(), sequence));

        Ok(Response::new(DeleteNodeResponse { id: req.id }))
    }
}
