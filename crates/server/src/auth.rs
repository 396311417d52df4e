//! Bearer-token gate for mutating RPCs.
//!
//! The write service is wrapped with [`AdminTokenInterceptor`] via
//! `NodeWriteServiceServer::with_interceptor`; the read service is
//! served without it. This module is the only place encoding the
//! policy: a single shared admin secret, compared with exact string
//! equality.

use tonic::metadata::MetadataMap;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Interceptor requiring `authorization: Bearer <admin secret>`.
#[derive(Debug, Clone)]
pub struct AdminTokenInterceptor {
    token: String,
}

impl AdminTokenInterceptor {
    /// Creates a gate for the configured admin secret.
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Interceptor for AdminTokenInterceptor {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        validate_token(request.metadata(), &self.token)?;
        Ok(request)
    }
}

/// Checks the authorization metadata against the expected secret.
///
/// # Errors
///
/// - UNAUTHENTICATED when the header is missing, not valid ASCII, or
///   not `Bearer `-prefixed;
/// - PERMISSION_DENIED when the bearer token mismatches.
pub fn validate_token(metadata: &MetadataMap, expected: &str) -> Result<(), Status> {
    let header = metadata
        .get("authorization")
        .ok_or_else(|| Status::unauthenticated("missing authorization header"))?;

    let header = header
        .to_str()
        .map_err(|_| Status::unauthenticated("invalid authorization header format"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Status::unauthenticated("invalid authorization header format"))?;

    if token != expected {
        return Err(Status::permission_denied("invalid token"));
    }

    Ok(())
}
