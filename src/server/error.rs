//! Errors surfaced to HTTP clients.

use crate::registry::RegistryError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{ALLOW, HeaderValue};
use hyper::{Method, Response, StatusCode};
use thiserror::Error;

/// A request that could not be served.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("count '{0}' is not a valid integer")]
    InvalidCount(String),

    #[error("count must be non-negative, got {0}")]
    NegativeCount(String),

    #[error("path segment '{0}' is not valid percent-encoded UTF-8")]
    InvalidEncoding(String),

    #[error("metric name '{0}' is reserved for service metrics")]
    ReservedName(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to encode metrics")]
    Encode(#[from] std::fmt::Error),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidCount(_)
            | Self::NegativeCount(_)
            | Self::InvalidEncoding(_)
            | Self::ReservedName(_)
            | Self::Registry(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a JSON `{"detail": ...}` response.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let body = serde_json::json!({ "detail": self.to_string() }).to_string();
        let mut response = super::routes::json_response(self.status(), body);
        if matches!(self, Self::MethodNotAllowed(_)) {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET"));
        }
        response
    }
}
