use std::sync::Arc;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::protocol::{API_PREFIX, IMPORT_FIELD, LOG_SOURCE_FILE, LOG_SOURCE_JOURNAL};
use shared::types::StatusSnapshot;
use crate::collaborators::LogSelector;
use crate::controller::ServerController;
use crate::error::PanelError;

/// Uploaded database images above this size are rejected
const MAX_IMPORT_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ServerController>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    fn new(msg: impl Into<String>) -> Json<Self> {
        Json(Self { msg: msg.into() })
    }
}

#[derive(Deserialize, Default)]
pub struct LogsForm {
    #[serde(default)]
    pub level: String,
    /// "file" (default) or "journal"
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct EchForm {
    #[serde(default)]
    pub sni: String,
}

pub fn router(state: AppState) -> Router {
    let server = Router::new()
        .route("/status", get(get_status))
        .route("/versions", get(get_versions))
        .route("/config", get(get_config))
        .route("/stop", post(stop))
        .route("/restart", post(restart))
        .route("/install/:version", post(install))
        .route("/logs/:count", post(get_logs))
        .route("/db", get(export_db).post(import_db))
        .route("/keys/x25519", get(x25519_keys))
        .route("/keys/mldsa65", get(mldsa65_keys))
        .route("/keys/vlessenc", get(vless_enc))
        .route("/keys/ech", post(ech_cert))
        .layer(DefaultBodyLimit::max(MAX_IMPORT_BYTES));

    Router::new()
        .nest(API_PREFIX, server)
        .with_state(state)
}

async fn get_status(State(state): State<AppState>) -> Json<Option<StatusSnapshot>> {
    Json(state.controller.status())
}

async fn get_versions(State(state): State<AppState>) -> Result<Json<Vec<String>>, PanelError> {
    state.controller.versions().await.map(Json)
}

async fn get_config(State(state): State<AppState>) -> Result<Json<serde_json::Value>, PanelError> {
    state.controller.config_json().await.map(Json)
}

async fn stop(State(state): State<AppState>) -> Result<Json<MessageResponse>, PanelError> {
    state.controller.stop().await?;
    Ok(MessageResponse::new("Proxy stopped"))
}

async fn restart(State(state): State<AppState>) -> Result<Json<MessageResponse>, PanelError> {
    state.controller.restart().await?;
    Ok(MessageResponse::new("Proxy restarted"))
}

async fn install(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<MessageResponse>, PanelError> {
    state.controller.install(&version).await?;
    Ok(MessageResponse::new(format!("Installed proxy {}", version)))
}

async fn get_logs(
    State(state): State<AppState>,
    Path(count): Path<usize>,
    form: Option<Form<LogsForm>>,
) -> Result<Json<Vec<String>>, PanelError> {
    // A request without a form body reads everything from the log file
    let form = form.map(|Form(form)| form).unwrap_or_default();
    let selector = match form.source.as_deref() {
        None | Some(LOG_SOURCE_FILE) => LogSelector::File,
        Some(LOG_SOURCE_JOURNAL) => LogSelector::Journal,
        Some(other) => {
            return Err(PanelError::BadRequest(format!("unknown log source: {}", other)));
        }
    };

    Ok(Json(state.controller.logs(count, &form.level, selector).await))
}

async fn x25519_keys(State(state): State<AppState>) -> Result<Json<serde_json::Value>, PanelError> {
    state.controller.x25519_keys().await.map(Json)
}

async fn mldsa65_keys(State(state): State<AppState>) -> Result<Json<serde_json::Value>, PanelError> {
    state.controller.mldsa65_keys().await.map(Json)
}

async fn vless_enc(State(state): State<AppState>) -> Result<Json<serde_json::Value>, PanelError> {
    state.controller.vless_enc().await.map(Json)
}

async fn ech_cert(
    State(state): State<AppState>,
    form: Option<Form<EchForm>>,
) -> Result<Json<serde_json::Value>, PanelError> {
    let form = form.map(|Form(form)| form).unwrap_or_default();
    let sni = form.sni.trim();
    if sni.is_empty() {
        return Err(PanelError::BadRequest("missing 'sni' field".to_string()));
    }

    state.controller.ech_cert(sni).await.map(Json)
}

async fn export_db(State(state): State<AppState>) -> Result<Response, PanelError> {
    let export = state.controller.export_database().await?;
    let disposition = format!("attachment; filename={}", export.filename);

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.bytes,
    )
        .into_response())
}

async fn import_db(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, PanelError> {
    let image = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| PanelError::BadRequest(format!("Error reading db file: {}", e)))?;

        match field {
            Some(field) if field.name() == Some(IMPORT_FIELD) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| PanelError::BadRequest(format!("Error reading db file: {}", e)))?;
                break bytes.to_vec();
            }
            Some(_) => continue,
            None => {
                return Err(PanelError::BadRequest(format!("missing '{}' field", IMPORT_FIELD)));
            }
        }
    };

    state.controller.import_database(image).await?;
    Ok(MessageResponse::new("Database imported"))
}
