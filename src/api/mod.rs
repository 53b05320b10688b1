mod handlers;
mod sessions;
mod viewer;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::InlayConfig;
use crate::db::Database;
use crate::engine::Engine;

pub use sessions::{EditorSessions, SharedEditor};
pub use viewer::{ROLE_HEADER, USER_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Engine<Database>,
    pub editors: EditorSessions,
}

impl AppState {
    pub fn new(db: Database, config: &InlayConfig) -> Self {
        let engine = Engine::from_config(Arc::new(db.clone()), config);
        Self {
            db,
            engine,
            editors: EditorSessions::new(Duration::from_secs(
                config.editor_idle_minutes.saturating_mul(60),
            )),
        }
    }
}

pub fn create_router(db: Database, config: &InlayConfig) -> Router {
    let api = Router::new()
        // Containers
        .route("/containers", get(handlers::list_containers))
        .route("/containers", post(handlers::create_container))
        .route("/containers/{id}", get(handlers::get_container))
        .route("/containers/{id}", put(handlers::update_container))
        .route("/containers/{id}", delete(handlers::delete_container))
        // Embedded records
        .route("/containers/{id}/records/{field}", get(handlers::list_records))
        .route("/containers/{id}/records/{field}", post(handlers::create_record))
        .route("/containers/{id}/records/{field}/order", put(handlers::reorder_records))
        .route("/containers/{id}/records/{field}/{record_id}", delete(handlers::delete_record))
        .route(
            "/containers/{id}/records/{field}/{record_id}/duplicate",
            post(handlers::duplicate_record),
        )
        .route(
            "/containers/{id}/records/{field}/{record_id}/group",
            put(handlers::assign_record_group),
        )
        .route("/containers/{id}/item", put(handlers::set_embedded_item))
        .route("/containers/{id}/item", delete(handlers::clear_embedded_item))
        // Groups
        .route("/containers/{id}/groups", get(handlers::list_groups))
        .route("/containers/{id}/groups", post(handlers::create_group))
        .route("/containers/{id}/groups/cleanup", post(handlers::cleanup_groups))
        .route("/containers/{id}/groups/{group_id}", put(handlers::update_group))
        .route("/containers/{id}/groups/{group_id}", delete(handlers::delete_group))
        .route(
            "/containers/{id}/groups/{group_id}/duplicate",
            post(handlers::duplicate_group),
        )
        // Editor sessions
        .route("/editors", post(handlers::open_editor))
        .route("/editors/{id}", get(handlers::get_editor))
        .route("/editors/{id}", delete(handlers::close_editor))
        .route("/editors/{id}/submit", post(handlers::submit_editor))
        .route("/editors/{id}/save", post(handlers::save_editor))
        .route("/editors/{id}/toggle", post(handlers::toggle_editor))
        .route("/editors/{id}/effects", post(handlers::create_effect))
        .route("/editors/{id}/effects/{effect_id}", put(handlers::update_effect))
        .route("/editors/{id}/effects/{effect_id}", delete(handlers::delete_effect))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(db, config))
}
