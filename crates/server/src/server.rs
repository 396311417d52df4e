//! gRPC server assembly.
//!
//! Wires the write service (behind the bearer-token interceptor) and
//! the read service into one tonic server with request-limit layers,
//! and supports graceful shutdown via a watch channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nodewatch_proto::proto::node_read_service_server::NodeReadServiceServer;
use nodewatch_proto::proto::node_write_service_server::NodeWriteServiceServer;
use nodewatch_store::{KvBackend, NodeStore};
use tokio::sync::watch;
use tonic::transport::Server;
use tower::ServiceBuilder;

use crate::auth::AdminTokenInterceptor;
use crate::broker::EventBroker;
use crate::services::{NodeReadServiceImpl, NodeWriteServiceImpl};

/// The nodewatch gRPC server.
#[derive(bon::Builder)]
pub struct NodeWatchServer<B: KvBackend + Clone> {
    /// Authoritative persistence shared by both services.
    store: NodeStore<B>,
    /// Live event fan-out shared by both services.
    broker: Arc<EventBroker>,
    /// Shared admin secret gating the write service.
    admin_token: String,
    /// Listen address.
    addr: SocketAddr,
    /// Max concurrent requests per connection.
    #[builder(default = 100)]
    max_concurrent: usize,
    /// Request timeout in seconds.
    #[builder(default = 30)]
    timeout_secs: u64,
    /// Shutdown signal; when `true` is sent, the server stops.
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl<B: KvBackend + Clone> NodeWatchServer<B> {
    /// Runs the server until shutdown (or forever without a signal).
    ///
    /// # Errors
    ///
    /// Returns the transport error if binding or serving fails.
    pub async fn serve(self) -> Result<(), tonic::transport::Error> {
        tracing::info!(
            max_concurrent = self.max_concurrent,
            timeout_secs = self.timeout_secs,
            "configuring request limits"
        );

        // Backpressure: bound concurrency, shed load when saturated,
        // and bound request time.
        let layer = ServiceBuilder::new()
            .concurrency_limit(self.max_concurrent)
            .load_shed()
            .timeout(Duration::from_secs(self.timeout_secs))
            .into_inner();

        let write_service = NodeWriteServiceImpl::builder()
            .store(self.store.clone())
            .broker(Arc::clone(&self.broker))
            .build();
        let read_service = NodeReadServiceImpl::builder()
            .store(self.store)
            .broker(self.broker)
            .build();

        let router = Server::builder()
            .layer(layer)
            .add_service(NodeWriteServiceServer::with_interceptor(
                write_service,
                AdminTokenInterceptor::new(self.admin_token.as_str()),
            ))
            .add_service(NodeReadServiceServer::new(read_service));

        match self.shutdown_rx {
            Some(mut shutdown_rx) => {
                router
                    .serve_with_shutdown(self.addr, async move {
                        let _ = shutdown_rx.changed().await;
                    })
                    .await
            },
            None => router.serve(self.addr).await,
        }
    }
}
