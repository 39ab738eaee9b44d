use std::sync::{Arc, atomic::AtomicBool};

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::{health_handler, not_found_handler, ready_handler, root_handler};

#[derive(Clone)]
pub struct AppState {
    pub cargo_pkg_name: &'static str,
    pub cargo_pkg_version: &'static str,
    pub ready: Arc<AtomicBool>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
