//! Shared application state for the Axum status server.

use std::sync::Arc;

use courier_storage::DeliveryLogger;

/// Application state shared across all route handlers via Axum `State`.
///
/// The storage handle is the same instance the consume loop writes to.
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub storage: Arc<dyn DeliveryLogger>,
}

impl AppState {
    pub fn new(service_name: impl Into<String>, storage: Arc<dyn DeliveryLogger>) -> Self {
        Self {
            service_name: service_name.into(),
            storage,
        }
    }
}
