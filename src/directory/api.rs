// Directory API - HTTP surface of the directory
//
// JSON bodies for writes and query strings for listings. Every error
// answers with a `{message}` body.

use std::io;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::directory::messages::{
    CredentialsRequest, DisconnectRequest, FileQuery, FilesResponse, HeartbeatRequest,
    HeartbeatResponse, LoginResponse, MessageResponse, ShareFilesRequest,
};
use crate::directory::service::{DirectoryError, DirectoryService};

impl DirectoryError {
    pub fn status(&self) -> StatusCode {
        match self {
            DirectoryError::Validation(_) | DirectoryError::Conflict => StatusCode::BAD_REQUEST,
            DirectoryError::Auth => StatusCode::UNAUTHORIZED,
            DirectoryError::UnknownPeer => StatusCode::NOT_FOUND,
            DirectoryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        (self.status(), Json(MessageResponse::new(self.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, DirectoryError>;

/// Bodies that are not JSON objects are reported like missing fields
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, DirectoryError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        warn!(error = %rejection, "rejected request body");
        DirectoryError::Validation(format!("Missing required fields! ({})", rejection.body_text()))
    })
}

/// Build the directory router
pub fn router(service: DirectoryService) -> Router {
    Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/heartbeat", post(handle_heartbeat))
        .route("/disconnect", post(handle_disconnect))
        .route("/share_files", post(handle_share_files))
        .route("/files", get(handle_files))
        .route("/search_files", get(handle_search_files))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve the directory API until the listener fails
pub async fn serve(listener: TcpListener, service: DirectoryService) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "directory listening");
    }
    axum::serve(listener, router(service)).await
}

async fn handle_register(
    State(service): State<DirectoryService>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    service.register(&body(payload)?)?;
    Ok(Json(MessageResponse::new("Registration successful!")))
}

async fn handle_login(
    State(service): State<DirectoryService>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let username = service.login(&body(payload)?)?;
    Ok(Json(LoginResponse {
        message: "Login successful!".to_string(),
        username,
    }))
}

async fn handle_heartbeat(
    State(service): State<DirectoryService>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> ApiResult<HeartbeatResponse> {
    let known = service.heartbeat(&body(payload)?)?;
    let message = if known {
        "Heartbeat received"
    } else {
        "Heartbeat received for unknown peer, register again"
    };
    Ok(Json(HeartbeatResponse {
        message: message.to_string(),
        known,
    }))
}

async fn handle_disconnect(
    State(service): State<DirectoryService>,
    payload: Result<Json<DisconnectRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    service.disconnect(&body(payload)?)?;
    Ok(Json(MessageResponse::new("Disconnected successfully")))
}

async fn handle_share_files(
    State(service): State<DirectoryService>,
    payload: Result<Json<ShareFilesRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    service.share_files(&body(payload)?)?;
    Ok(Json(MessageResponse::new("Files shared successfully!")))
}

async fn handle_files(
    State(service): State<DirectoryService>,
    Query(query): Query<FileQuery>,
) -> ApiResult<FilesResponse> {
    let entries = service.list_files(&query)?;
    Ok(Json(FilesResponse::from_entries(entries)))
}

async fn handle_search_files(
    State(service): State<DirectoryService>,
    Query(query): Query<FileQuery>,
) -> ApiResult<FilesResponse> {
    let entries = service.search_files(&query)?;
    Ok(Json(FilesResponse::from_entries(entries)))
}
