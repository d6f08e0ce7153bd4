use axum::{extract::State, http::StatusCode, Json};

use crate::settings::SettingsError;
use crate::state::{AppState, JsonResult, ServerNameBody, ServerNameUpdated};
use crate::utils::json_error;

pub async fn get_server_name(State(state): State<AppState>) -> JsonResult<ServerNameBody> {
    match state.settings.server_name() {
        Ok(server_name) => Ok(Json(ServerNameBody { server_name })),
        Err(err) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("settings error: {}", err),
        )),
    }
}

pub async fn update_server_name(
    State(state): State<AppState>,
    Json(body): Json<ServerNameBody>,
) -> JsonResult<ServerNameUpdated> {
    match state.settings.set_server_name(&body.server_name) {
        Ok(settings) => Ok(Json(ServerNameUpdated {
            message: "Server name updated successfully",
            server_name: settings.server_name,
        })),
        Err(SettingsError::EmptyName) => Err(json_error(
            StatusCode::BAD_REQUEST,
            "Server name cannot be empty.",
        )),
        Err(err) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("settings error: {}", err),
        )),
    }
}
