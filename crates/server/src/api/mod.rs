pub mod library;
pub mod settings;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::scan::describe_status;
use crate::state::{AppState, HealthResponse};

pub fn api_router(state: AppState) -> Router {
    let library_routes = Router::new()
        .route("/scan", post(library::scan_library))
        .route("/artists", get(library::list_artists))
        .route("/albums", get(library::list_albums))
        .route("/tracks", get(library::list_album_tracks))
        .route("/search", get(library::search))
        .route("/artwork/:album_id", get(library::get_artwork))
        .route("/recently-added", get(library::recently_added));

    let settings_routes = Router::new().route(
        "/server-name",
        get(settings::get_server_name).put(settings::update_server_name),
    );

    Router::new()
        .route("/health", get(health))
        .nest("/library", library_routes)
        .nest("/settings", settings_routes)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (scan, last_scan) = describe_status(&state.scan_status.read());
    Json(HealthResponse {
        status: "ok",
        scan,
        last_scan,
    })
}
