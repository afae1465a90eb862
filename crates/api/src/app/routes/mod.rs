use axum::{
    Router,
    routing::{get, post},
};

pub mod crm;
pub mod families;
pub mod notes;
pub mod system;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/", get(system::root))
        .route("/sync-events", get(system::sync_events))
        .route("/sync-patient-families", post(families::sync_action))
        .route("/patient-families", get(families::list_families))
        .route("/clear-cache", post(families::clear_cache))
        .route("/query-contact-notes", post(notes::query_contact_notes))
        .route("/virtuous-api", post(crm::proxy))
}
