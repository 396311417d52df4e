//! nodewatch server library.
//!
//! Exposes the building blocks the binary wires together, so the
//! integration tests can assemble the same stack over the in-memory
//! backend:
//! - [`services`]: the write and read+watch gRPC services
//! - [`broker`]: in-process event fan-out to subscribed watchers
//! - [`auth`]: the bearer-token gate for mutating RPCs
//! - [`pagination`]: opaque HMAC-signed list page tokens
//! - [`server`]: tonic server assembly with request-limit layers
//! - [`health`]: the /healthz + /readyz HTTP surface
//! - [`config`]: process configuration from the environment

#![deny(unsafe_code)]
// gRPC services return tonic::Status - standard practice for gRPC error handling
#![allow(clippy::result_large_err)]

pub mod auth;
pub mod broker;
pub mod config;
pub mod health;
pub mod pagination;
pub mod server;
pub mod services;
pub mod shutdown;

pub use broker::EventBroker;
pub use config::Config;
pub use server::NodeWatchServer;
