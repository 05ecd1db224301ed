//! Persona and scenario catalog.

use axum::response::IntoResponse;
use serde::Serialize;

use reunion_core::{CatalogEntry, ROLES, SCENARIOS};

use crate::error::ok;

/// Catalog response body.
#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    /// Bindable personas.
    pub roles: &'static [CatalogEntry],
    /// Scenarios.
    pub scenarios: &'static [CatalogEntry],
}

/// List persona and scenario keys with their labels.
///
/// `GET /api/catalog`
pub async fn catalog() -> impl IntoResponse {
    ok(CatalogResponse {
        roles: ROLES,
        scenarios: SCENARIOS,
    })
}
