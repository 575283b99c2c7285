use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use wabridge_actions::{CallRequest, GroupAddError, GroupAddWorkflow, Invoker};
use wabridge_core::types::{ChatInfo, MediaPayload, MessageContent, SendOptions};
use wabridge_core::Error;
use wabridge_session::{EventForwarder, SessionClient, SessionHandle};

// ---------------------------------------------------------------------------
// Shared state passed to HTTP handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct GatewayState {
    pub session: Arc<SessionHandle>,
    pub invoker: Arc<Invoker>,
    pub group_add: Arc<GroupAddWorkflow>,
    pub forwarder: EventForwarder,
    /// Used to download media referenced by URL.
    pub http: reqwest::Client,
    pub invite_base_url: String,
    pub api_token: Option<String>,
}

fn secure_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (&x, &y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// Bearer token authentication middleware
// ---------------------------------------------------------------------------

async fn auth_middleware(
    State(state): State<GatewayState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match &state.api_token {
        Some(t) if !t.is_empty() => t,
        _ => return next.run(req).await,
    };

    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|provided| secure_eq(provided, token))
        .unwrap_or(false);

    if authorized {
        next.run(req).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "error": "Unauthorized: invalid or missing Bearer token" })),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub enum ApiError {
    Core(Error),
    GroupAdd(GroupAddError),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Core(e)
    }
}

impl From<GroupAddError> for ApiError {
    fn from(e: GroupAddError) -> Self {
        match e {
            GroupAddError::Session(e) => ApiError::Core(e),
            other => ApiError::GroupAdd(other),
        }
    }
}

fn core_status(e: &Error) -> StatusCode {
    match e {
        Error::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Validation(_) | Error::NotAGroup(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) | Error::MethodNotFound { .. } => StatusCode::NOT_FOUND,
        Error::PermissionDenied(_) | Error::MethodNotAllowed { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Core(Error::NotReady(state)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "success": false, "error": "Client not ready", "state": state })),
            )
                .into_response(),
            ApiError::Core(e) => {
                let status = core_status(&e);
                if status.is_server_error() {
                    warn!(error = %e, "Request failed");
                }
                (status, Json(json!({ "success": false, "error": e.to_string() }))).into_response()
            }
            ApiError::GroupAdd(GroupAddError::AllParticipantsFailed { code, message, results }) => {
                let status = StatusCode::from_u16(code)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (
                    status,
                    Json(json!({
                        "success": false,
                        "error": "Failed to add participants",
                        "message": message,
                        "code": code,
                        "result": results,
                    })),
                )
                    .into_response()
            }
            ApiError::GroupAdd(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response(),
        }
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

// ---------------------------------------------------------------------------
// HTTP request types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetCallbackRequest {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    chat_id: String,
    message: String,
    #[serde(default)]
    quoted_message_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMediaRequest {
    chat_id: String,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMessageRequest {
    message_id: String,
    #[serde(default)]
    everyone: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantsRequest {
    #[serde(default)]
    participant_id: Option<String>,
    #[serde(default)]
    participants: Option<Value>,
}

impl ParticipantsRequest {
    /// `participants` may be a single id or a list; `participantId` is folded in.
    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match &self.participants {
            Some(Value::String(id)) => vec![id.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        if let Some(id) = &self.participant_id {
            ids.push(id.clone());
        }
        ids.retain(|id| !id.trim().is_empty());
        ids
    }

    fn require_ids(&self) -> Result<Vec<String>, Error> {
        let ids = self.ids();
        if ids.is_empty() {
            return Err(Error::Validation("participants is required".to_string()));
        }
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_health(State(state): State<GatewayState>) -> Json<Value> {
    let current = state.session.state().await;
    Json(json!({
        "status": "ok",
        "ready": current.is_ready(),
        "state": current,
    }))
}

async fn handle_set_callback(
    State(state): State<GatewayState>,
    Json(req): Json<SetCallbackRequest>,
) -> ApiResult {
    state.forwarder.set_listener(req.url.as_deref()).await?;
    Ok(Json(json!({ "success": true })))
}

async fn handle_send_message(
    State(state): State<GatewayState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult {
    let client = state.session.client().await?;
    if req.chat_id.trim().is_empty() {
        return Err(Error::Validation("chatId is required".to_string()).into());
    }
    let options = SendOptions {
        quoted_message_id: req.quoted_message_id,
        ..SendOptions::default()
    };
    let sent = client
        .send_message(&req.chat_id, MessageContent::text(req.message), options)
        .await?;
    Ok(Json(json!({ "success": true, "messageId": sent.id })))
}

/// Largest media body accepted from `mediaUrl`.
const MAX_MEDIA_BYTES: u64 = 64 * 1024 * 1024;

/// Download `url` and return it as a base64 payload. Bodies over `max_bytes`
/// are rejected without being buffered in full.
async fn fetch_media(
    http: &reqwest::Client,
    url: &str,
    filename: Option<String>,
    max_bytes: u64,
) -> Result<MediaPayload, Error> {
    let parsed = url::Url::parse(url).map_err(|e| Error::Validation(format!("invalid mediaUrl: {}", e)))?;
    let mut resp = http
        .get(parsed.clone())
        .send()
        .await
        .map_err(|e| Error::Http(format!("media download failed: {}", e)))?;
    if !resp.status().is_success() {
        return Err(Error::Http(format!("media download returned {}", resp.status())));
    }
    if let Some(len) = resp.content_length().filter(|len| *len > max_bytes) {
        return Err(Error::Validation(format!(
            "media is {} bytes, limit is {}",
            len, max_bytes
        )));
    }

    let header_mime = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "application/octet-stream");
    let mimetype = header_mime.unwrap_or_else(|| {
        mime_guess::from_path(parsed.path())
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    let filename = filename.or_else(|| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    });

    let mut bytes = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| Error::Http(format!("media download failed: {}", e)))?
    {
        if (bytes.len() + chunk.len()) as u64 > max_bytes {
            return Err(Error::Validation(format!("media exceeds limit of {} bytes", max_bytes)));
        }
        bytes.extend_from_slice(&chunk);
    }
    debug!(url, size = bytes.len(), mimetype = %mimetype, "Media downloaded");
    Ok(MediaPayload {
        mimetype,
        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        filename,
    })
}

async fn handle_send_media(
    State(state): State<GatewayState>,
    Json(req): Json<SendMediaRequest>,
) -> ApiResult {
    let client = state.session.client().await?;
    let media = match (req.media_url.as_deref(), req.data, req.mimetype) {
        (Some(url), _, _) if !url.trim().is_empty() => fetch_media(&state.http, url.trim(), req.filename, MAX_MEDIA_BYTES).await?,
        (_, Some(data), Some(mimetype)) => MediaPayload {
            mimetype,
            data,
            filename: req.filename,
        },
        _ => {
            return Err(Error::Validation("mediaUrl or data with mimetype is required".to_string()).into());
        }
    };
    let options = SendOptions {
        caption: req.caption,
        ..SendOptions::default()
    };
    let sent = client
        .send_message(&req.chat_id, MessageContent::Media { media }, options)
        .await?;
    Ok(Json(json!({ "success": true, "messageId": sent.id })))
}

async fn handle_delete_message(
    State(state): State<GatewayState>,
    Json(req): Json<DeleteMessageRequest>,
) -> ApiResult {
    let client = state.session.client().await?;
    let message = client
        .get_message_by_id(&req.message_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("message {}", req.message_id)))?;
    client.delete_message(&message.id, req.everyone).await?;
    Ok(Json(json!({ "success": true })))
}

async fn handle_chat(State(state): State<GatewayState>, AxumPath(chat_id): AxumPath<String>) -> ApiResult {
    let client = state.session.client().await?;
    let chat = client
        .get_chat_by_id(&chat_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))?;
    let participants = chat.is_group.then_some(chat.participants.len());
    Ok(Json(json!({
        "id": chat.id,
        "name": chat.name,
        "isGroup": chat.is_group,
        "participants": participants,
    })))
}

async fn handle_contact(State(state): State<GatewayState>, AxumPath(contact_id): AxumPath<String>) -> ApiResult {
    let client = state.session.client().await?;
    let contact = client
        .get_contact_by_id(&contact_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("contact {}", contact_id)))?;
    Ok(Json(serde_json::to_value(contact).map_err(Error::from)?))
}

async fn handle_message(State(state): State<GatewayState>, AxumPath(message_id): AxumPath<String>) -> ApiResult {
    let client = state.session.client().await?;
    let message = client
        .get_message_by_id(&message_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))?;
    Ok(Json(serde_json::to_value(message).map_err(Error::from)?))
}

async fn require_group(client: &dyn SessionClient, group_id: &str) -> Result<ChatInfo, Error> {
    match client.get_chat_by_id(group_id).await? {
        Some(chat) if chat.is_group => Ok(chat),
        Some(_) => Err(Error::NotAGroup(group_id.to_string())),
        None => Err(Error::NotFound(format!("group {}", group_id))),
    }
}

async fn handle_group_members(
    State(state): State<GatewayState>,
    AxumPath(group_id): AxumPath<String>,
) -> ApiResult {
    let client = state.session.client().await?;
    let group = require_group(client.as_ref(), &group_id).await?;
    Ok(Json(json!({ "participants": group.participants })))
}

async fn handle_group_add(
    State(state): State<GatewayState>,
    AxumPath(group_id): AxumPath<String>,
    Json(req): Json<ParticipantsRequest>,
) -> ApiResult {
    let client = state.session.client().await?;
    let ids = req.require_ids()?;
    info!(group_id = %group_id, count = ids.len(), "Group add requested");
    let report = state.group_add.run(client.as_ref(), &group_id, &ids).await?;
    Ok(Json(serde_json::to_value(report).map_err(Error::from)?))
}

#[derive(Clone, Copy)]
enum MemberChange {
    Remove,
    Promote,
    Demote,
}

async fn change_members(
    state: GatewayState,
    group_id: String,
    req: ParticipantsRequest,
    change: MemberChange,
) -> ApiResult {
    let client = state.session.client().await?;
    let ids = req.require_ids()?;
    let group = require_group(client.as_ref(), &group_id).await?;
    match change {
        MemberChange::Remove => client.remove_participants(&group.id, &ids).await?,
        MemberChange::Promote => client.promote_participants(&group.id, &ids).await?,
        MemberChange::Demote => client.demote_participants(&group.id, &ids).await?,
    }
    Ok(Json(json!({ "success": true })))
}

async fn handle_group_remove(
    State(state): State<GatewayState>,
    AxumPath(group_id): AxumPath<String>,
    Json(req): Json<ParticipantsRequest>,
) -> ApiResult {
    change_members(state, group_id, req, MemberChange::Remove).await
}

async fn handle_group_promote(
    State(state): State<GatewayState>,
    AxumPath(group_id): AxumPath<String>,
    Json(req): Json<ParticipantsRequest>,
) -> ApiResult {
    change_members(state, group_id, req, MemberChange::Promote).await
}

async fn handle_group_demote(
    State(state): State<GatewayState>,
    AxumPath(group_id): AxumPath<String>,
    Json(req): Json<ParticipantsRequest>,
) -> ApiResult {
    change_members(state, group_id, req, MemberChange::Demote).await
}

async fn handle_invite_link(
    State(state): State<GatewayState>,
    AxumPath(group_id): AxumPath<String>,
) -> ApiResult {
    let client = state.session.client().await?;
    let group = require_group(client.as_ref(), &group_id).await?;
    let code = client.get_invite_code(&group.id).await?;
    Ok(Json(json!({
        "inviteCode": code,
        "inviteLink": format!("{}{}", state.invite_base_url, code),
    })))
}

async fn handle_call(State(state): State<GatewayState>, Json(req): Json<CallRequest>) -> ApiResult {
    let result = state.invoker.call(&req).await?;
    Ok(Json(json!({ "success": true, "result": result })))
}

async fn handle_capabilities(State(state): State<GatewayState>) -> Json<Value> {
    let gate = state.invoker.gate();
    Json(json!({
        "allowAll": gate.allow_all(),
        "scopes": gate.scopes(),
    }))
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/set-callback", post(handle_set_callback))
        .route("/send-message", post(handle_send_message))
        .route("/send-media", post(handle_send_media))
        .route("/delete-message", post(handle_delete_message))
        .route("/chat/:chat_id", get(handle_chat))
        .route("/contact/:contact_id", get(handle_contact))
        .route("/message/:message_id", get(handle_message))
        .route("/group/:group_id/members", get(handle_group_members))
        .route("/group/:group_id/add", post(handle_group_add))
        .route("/group/:group_id/remove", post(handle_group_remove))
        .route("/group/:group_id/promote", post(handle_group_promote))
        .route("/group/:group_id/demote", post(handle_group_demote))
        .route("/group/:group_id/invite-link", get(handle_invite_link))
        .route("/call", post(handle_call))
        .route("/capabilities", get(handle_capabilities))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(CorsLayer::permissive().allow_credentials(false))
        .with_state(state)
}
