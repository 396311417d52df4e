//! End-to-end node lifecycle scenarios over the in-memory backend.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

mod common;

use common::{TestStack, proto_node};
use nodewatch_proto::proto;
use nodewatch_proto::proto::node_read_service_server::NodeReadService;
use nodewatch_proto::proto::node_write_service_server::NodeWriteService;
use nodewatch_server::auth::AdminTokenInterceptor;
use tonic::service::Interceptor;
use tonic::{Code, Request};

async fn list_ids(stack: &TestStack, type_filter: i32, status_filter: i32) -> Vec<String> {
    stack
        .read
        .list_nodes(Request::new(proto::ListNodesRequest {
            page_size: 0,
            page_token: String::new(),
            type_filter,
            status_filter,
        }))
        .await
        .expect("list")
        .into_inner()
        .nodes
        .into_iter()
        .map(|n| n.id)
        .collect()
}

// S1 - create then get
#[tokio::test]
async fn create_then_get_round_trips() {
    let stack = TestStack::new();

    let created = stack.create_node(proto_node(proto::NodeType::Vm, "web-01")).await;
    assert!(!created.id.is_empty());
    assert_eq!(created.status, proto::NodeStatus::Unknown as i32);
    assert!(created.last_seen.is_some());

    let fetched = stack
        .read
        .get_node(Request::new(proto::GetNodeRequest { id: created.id.clone() }))
        .await
        .expect("get")
        .into_inner()
        .node
        .expect("node");
    assert_eq!(fetched, created);
}

// S2 - unique-name collision
#[tokio::test]
async fn duplicate_name_within_a_type_is_rejected() {
    let stack = TestStack::new();

    stack.create_node(proto_node(proto::NodeType::Vm, "db-1")).await;

    let err = stack
        .write
        .create_node(Request::new(proto::CreateNodeRequest {
            node: Some(proto_node(proto::NodeType::Vm, "db-1")),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);

    // Same name under a different type is permitted
    stack.create_node(proto_node(proto::NodeType::Baremetal, "db-1")).await;
}

// S4 - index reassignment on type change
#[tokio::test]
async fn type_change_moves_the_node_between_type_indexes() {
    let stack = TestStack::new();
    let created = stack.create_node(proto_node(proto::NodeType::Vm, "x")).await;

    let vm = proto::NodeType::Vm as i32;
    let baremetal = proto::NodeType::Baremetal as i32;
    assert_eq!(list_ids(&stack, vm, 0).await, vec![created.id.clone()]);
    assert!(list_ids(&stack, baremetal, 0).await.is_empty());

    stack
        .write
        .update_node(Request::new(proto::UpdateNodeRequest {
            node: Some(proto::Node { r#type: baremetal, ..created.clone() }),
        }))
        .await
        .expect("update");

    assert!(list_ids(&stack, vm, 0).await.is_empty());
    assert_eq!(list_ids(&stack, baremetal, 0).await, vec![created.id]);
}

// Invariant 1 - get and unfiltered list agree
#[tokio::test]
async fn get_and_unfiltered_list_agree() {
    let stack = TestStack::new();
    for i in 0..4 {
        stack.create_node(proto_node(proto::NodeType::Container, &format!("c-{i}"))).await;
    }

    let ids = list_ids(&stack, 0, 0).await;
    assert_eq!(ids.len(), 4);
    for id in &ids {
        let fetched = stack
            .read
            .get_node(Request::new(proto::GetNodeRequest { id: id.clone() }))
            .await
            .expect("every listed id must resolve")
            .into_inner()
            .node
            .expect("node");
        assert!(ids.contains(&fetched.id));
    }
}

// Invariant 6 - delete leaves nothing behind
#[tokio::test]
async fn delete_removes_the_node_from_every_listing() {
    let stack = TestStack::new();
    let created = stack.create_node(proto_node(proto::NodeType::Vm, "web-01")).await;

    stack
        .write
        .delete_node(Request::new(proto::DeleteNodeRequest { id: created.id.clone() }))
        .await
        .expect("delete");

    assert!(list_ids(&stack, 0, 0).await.is_empty());
    assert!(list_ids(&stack, proto::NodeType::Vm as i32, 0).await.is_empty());
    assert!(
        list_ids(&stack, 0, proto::NodeStatus::Unknown as i32).await.is_empty()
    );

    let err = stack
        .read
        .get_node(Request::new(proto::GetNodeRequest { id: created.id }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

// Pagination across services: tokens are opaque but resumable
#[tokio::test]
async fn listing_pages_to_completion_with_tokens() {
    let stack = TestStack::new();
    for i in 0..7 {
        stack.create_node(proto_node(proto::NodeType::Vm, &format!("n-{i}"))).await;
    }

    let mut collected = Vec::new();
    let mut token = String::new();
    for _ in 0..10 {
        let resp = stack
            .read
            .list_nodes(Request::new(proto::ListNodesRequest {
                page_size: 3,
                page_token: token.clone(),
                type_filter: 0,
                status_filter: 0,
            }))
            .await
            .expect("list")
            .into_inner();
        collected.extend(resp.nodes.into_iter().map(|n| n.id));
        if resp.next_page_token.is_empty() {
            break;
        }
        token = resp.next_page_token;
    }

    collected.sort();
    collected.dedup();
    assert_eq!(collected.len(), 7);
}

// S6 - auth gate on the write surface
#[test]
fn mutating_calls_require_the_admin_bearer_token() {
    let mut gate = AdminTokenInterceptor::new("configured-secret");

    // No auth metadata
    let err = gate.call(Request::new(())).unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    // Wrong bearer token
    let mut request = Request::new(());
    request
        .metadata_mut()
        .insert("authorization", "Bearer wrong".parse().unwrap());
    let err = gate.call(request).unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);

    // Configured token passes
    let mut request = Request::new(());
    request
        .metadata_mut()
        .insert("authorization", "Bearer configured-secret".parse().unwrap());
    assert!(gate.call(request).is_ok());
}

// S6 - reads succeed with no credential at all
#[tokio::test]
async fn reads_require_no_credential() {
    let stack = TestStack::new();
    stack.create_node(proto_node(proto::NodeType::Vm, "web-01")).await;

    // The read service is served without the interceptor; a bare
    // request must succeed.
    let resp = stack
        .read
        .list_nodes(Request::new(proto::ListNodesRequest {
            page_size: 0,
            page_token: String::new(),
            type_filter: 0,
            status_filter: 0,
        }))
        .await
        .expect("list without credential");
    assert_eq!(resp.into_inner().nodes.len(), 1);
}
