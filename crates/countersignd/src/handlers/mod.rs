//! http handlers for the countersignd api endpoints.

mod error;
mod requests;

pub use error::ApiError;
pub use requests::{create_request, endorse_request, list_requests, request_status};
