use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crate::error::PanelError;

impl PanelError {
    fn status_code(&self) -> StatusCode {
        match self {
            PanelError::InvalidFilename(_) | PanelError::BadRequest(_) => StatusCode::BAD_REQUEST,
            PanelError::Upstream(_)
            | PanelError::InconsistentState { .. }
            | PanelError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self);
        }

        let body = serde_json::json!({ "error": format!("{:#}", self) });
        (status, Json(body)).into_response()
    }
}
