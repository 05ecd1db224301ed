//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

pub mod account;
pub mod agents;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod health;
pub mod stage;

/// A `302 Found` redirect to `location`.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
