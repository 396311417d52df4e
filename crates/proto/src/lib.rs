//! Protobuf types and conversions for nodewatch.
//!
//! This crate provides:
//! - Generated protobuf types and gRPC service traits ([`proto`])
//! - Conversions between domain types and proto types ([`convert`])
//!
//! Kept separate from the server crate so consumers needing only the
//! wire format can avoid pulling in service internals.

#![deny(unsafe_code)]
// gRPC services return tonic::Status - standard practice for gRPC error handling
#![allow(clippy::result_large_err)]

/// Generated protobuf types and service traits.
pub mod proto {
    #![allow(clippy::all)]
    #![allow(missing_docs)]

    tonic::include_proto!("nodewatch.v1");
}

/// Conversions between domain and protobuf types.
pub mod convert;

pub use convert::ConvertError;
