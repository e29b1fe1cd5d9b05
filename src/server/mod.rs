//! HTTP surface: listener, routing, and handlers.

mod error;
mod listener;
mod routes;

pub use error::ApiError;
pub use listener::HttpServer;
pub use routes::{Endpoint, handle_request, match_route, parse_count};
