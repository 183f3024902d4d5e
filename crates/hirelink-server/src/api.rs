use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use hirelink_chat::{ChatService, ClientRegistry, MessageDraft};
use hirelink_shared::{ChatError, JobId, MessageId, RequestId, RoomId, ScheduleId, UserId};
use hirelink_store::{
    Attachment, ChatRequest, ChatRoom, Database, Job, Location, MessageView, RequestStatus,
    ScheduledMessage, User,
};

use crate::auth::AuthUser;
use crate::blob_store::AttachmentStore;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub store: Arc<Mutex<Database>>,
    pub registry: Arc<ClientRegistry>,
    pub attachments: Arc<AttachmentStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/users", post(create_user))
        .route("/jobs", post(create_job))
        .route("/chat/requests", post(create_chat_request))
        .route("/chat/requests", get(list_received_requests))
        .route("/chat/requests/sent", get(list_sent_requests))
        .route("/chat/requests/accepted", get(list_accepted_requests))
        .route("/chat/requests/{id}/respond", post(respond_chat_request))
        .route("/chat/rooms", post(create_or_get_room))
        .route("/chat/rooms", get(list_rooms))
        .route("/chat/rooms/{id}/messages", get(list_messages))
        .route("/chat/rooms/{id}/messages", post(send_message))
        .route("/chat/rooms/{id}/last-seen", get(room_last_seen))
        .route("/chat/rooms/{id}/clear", post(clear_room))
        .route(
            "/chat/rooms/{room_id}/messages/{id}",
            delete(delete_message_for_everyone),
        )
        .route("/chat/unread-counts", get(unread_counts))
        .route("/chat/messages/{id}", patch(edit_message))
        .route("/chat/messages/{id}/me", delete(delete_message_for_me))
        .route("/chat/messages/{id}/reaction", post(set_reaction))
        .route("/chat/messages/{id}/reaction", delete(remove_reaction))
        .route("/chat/messages/{id}/star", post(star_message))
        .route("/chat/messages/{id}/star", delete(unstar_message))
        .route("/schedule/rooms/{id}", post(create_scheduled))
        .route("/schedule/rooms/{id}", get(list_scheduled))
        .route("/schedule/{id}", patch(update_scheduled))
        .route("/schedule/{id}", delete(cancel_scheduled))
        .route("/blob/upload", post(blob_upload))
        .route("/blob/{id}", get(blob_download))
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(state.config.max_attachment_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---- Users and jobs (minimal records the chat core references) ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    full_name: String,
    email: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, ServerError> {
    if req.full_name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(ServerError::BadRequest("name and email are required".into()));
    }
    let user = User {
        id: UserId::new(),
        full_name: req.full_name.trim().to_string(),
        email: req.email.trim().to_string(),
        avatar_url: req.avatar_url,
        last_seen: None,
        created_at: Utc::now(),
    };
    let db = state.store.lock().await;
    db.create_user(&user)?;
    info!(user = %user.id, "User registered");
    Ok(Json(user))
}

#[derive(Deserialize)]
struct CreateJobRequest {
    title: String,
}

async fn create_job(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<Job>, ServerError> {
    if req.title.trim().is_empty() {
        return Err(ServerError::BadRequest("title is required".into()));
    }
    let job = Job {
        id: JobId::new(),
        title: req.title.trim().to_string(),
        created_by: me,
        created_at: Utc::now(),
    };
    let db = state.store.lock().await;
    db.create_job(&job)?;
    Ok(Json(job))
}

// ---- Chat requests ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatRequestBody {
    to_user: UserId,
    job_id: JobId,
}

async fn create_chat_request(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateChatRequestBody>,
) -> Result<Json<ChatRequest>, ServerError> {
    if req.to_user == me {
        return Err(ServerError::BadRequest("cannot request a chat with yourself".into()));
    }

    let db = state.store.lock().await;
    db.get_job(req.job_id)?;
    db.get_user(req.to_user)?;
    if db.find_pending_request(me, req.to_user, req.job_id)?.is_some() {
        return Err(ChatError::Conflict("a pending request already exists".into()).into());
    }

    let request = ChatRequest {
        id: RequestId::new(),
        from_user: me,
        to_user: req.to_user,
        job_id: req.job_id,
        status: RequestStatus::Pending,
        created_at: Utc::now(),
    };
    db.create_chat_request(&request)?;
    info!(request = %request.id, job = %request.job_id, "Chat request created");
    Ok(Json(request))
}

async fn list_received_requests(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatRequest>>, ServerError> {
    let db = state.store.lock().await;
    Ok(Json(db.list_requests_to(me, RequestStatus::Pending)?))
}

async fn list_sent_requests(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatRequest>>, ServerError> {
    let db = state.store.lock().await;
    Ok(Json(db.list_requests_from(me, RequestStatus::Pending)?))
}

/// Accepted requests in either direction, i.e. the chats the caller may
/// open a room for.
async fn list_accepted_requests(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatRequest>>, ServerError> {
    let db = state.store.lock().await;
    let mut requests = db.list_requests_to(me, RequestStatus::Accepted)?;
    requests.extend(db.list_requests_from(me, RequestStatus::Accepted)?);
    requests.sort_by_key(|r| r.created_at);
    Ok(Json(requests))
}

#[derive(Deserialize)]
struct RespondRequestBody {
    status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RespondRequestResponse {
    request: ChatRequest,
    /// Present when the response was an acceptance.
    room: Option<ChatRoom>,
}

/// Accepting flips the request to ACCEPTED, materializes the room
/// (reusing an existing one for the same job and pair), and emails the
/// requester.
async fn respond_chat_request(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Json(body): Json<RespondRequestBody>,
) -> Result<Json<RespondRequestResponse>, ServerError> {
    let status = match RequestStatus::parse(&body.status) {
        Some(status @ (RequestStatus::Accepted | RequestStatus::Rejected)) => status,
        _ => {
            return Err(ServerError::BadRequest(
                "status must be ACCEPTED or REJECTED".into(),
            ))
        }
    };

    let (request, room) = {
        let db = state.store.lock().await;
        let request = db.get_chat_request(id)?;
        if request.to_user != me {
            return Err(ChatError::AccessDenied("not the recipient of this request".into()).into());
        }
        if request.status != RequestStatus::Pending {
            return Err(ChatError::Conflict(format!(
                "request already {}",
                request.status.as_str()
            ))
            .into());
        }
        db.set_request_status(id, status)?;

        let room = if status == RequestStatus::Accepted {
            match db.find_room_for_job(request.job_id, request.from_user, request.to_user)? {
                Some(room) => Some(room),
                None => {
                    let room = ChatRoom {
                        id: RoomId::new(),
                        job_id: request.job_id,
                        participants: vec![request.from_user, request.to_user],
                        created_at: Utc::now(),
                    };
                    db.create_room(&room)?;
                    info!(room = %room.id, request = %id, "Chat room created");
                    Some(room)
                }
            }
        } else {
            None
        };
        (db.get_chat_request(id)?, room)
    };

    if status == RequestStatus::Accepted {
        state
            .service
            .notify_user(
                request.from_user,
                "Your chat request was accepted".to_string(),
                "You can now start chatting about the job.".to_string(),
            )
            .await;
    }

    Ok(Json(RespondRequestResponse { request, room }))
}

// ---- Rooms ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest {
    job_id: JobId,
    with_user: UserId,
}

/// Create-or-get the room for a job and counterpart. Requires an
/// accepted request between the pair for that job.
async fn create_or_get_room(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<ChatRoom>, ServerError> {
    if req.with_user == me {
        return Err(ServerError::BadRequest("cannot open a room with yourself".into()));
    }

    let db = state.store.lock().await;
    if let Some(room) = db.find_room_for_job(req.job_id, me, req.with_user)? {
        return Ok(Json(room));
    }

    let accepted = db
        .list_requests_to(me, RequestStatus::Accepted)?
        .into_iter()
        .chain(db.list_requests_from(me, RequestStatus::Accepted)?)
        .any(|r| {
            r.job_id == req.job_id
                && (r.from_user == req.with_user || r.to_user == req.with_user)
        });
    if !accepted {
        return Err(ChatError::AccessDenied("no accepted chat request for this job".into()).into());
    }

    let room = ChatRoom {
        id: RoomId::new(),
        job_id: req.job_id,
        participants: vec![me, req.with_user],
        created_at: Utc::now(),
    };
    db.create_room(&room)?;
    info!(room = %room.id, job = %req.job_id, "Chat room created");
    Ok(Json(room))
}

async fn list_rooms(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatRoom>>, ServerError> {
    let db = state.store.lock().await;
    Ok(Json(db.list_rooms_for_user(me)?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LastSeenEntry {
    user_id: UserId,
    last_seen: Option<DateTime<Utc>>,
}

async fn room_last_seen(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Vec<LastSeenEntry>>, ServerError> {
    let db = state.store.lock().await;
    if !db.is_room_participant(id, me)? {
        return Err(ChatError::AccessDenied("not a participant of this room".into()).into());
    }
    let entries = db
        .last_seen_for_room(id, me)?
        .into_iter()
        .map(|(user_id, last_seen)| LastSeenEntry { user_id, last_seen })
        .collect();
    Ok(Json(entries))
}

// ---- Messages ----

async fn list_messages(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Vec<MessageView>>, ServerError> {
    Ok(Json(state.service.fetch_messages(id, me).await?))
}

/// Multipart send: `text`, optional `parent` (message id), optional
/// `location` (JSON), optional `file` (the attachment).
async fn send_message(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
    mut multipart: Multipart,
) -> Result<Json<MessageView>, ServerError> {
    let mut draft = MessageDraft::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "text" => {
                draft.text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read text: {e}")))?;
            }
            "parent" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read parent: {e}")))?;
                draft.parent = Some(
                    MessageId::parse(raw.trim())
                        .map_err(|_| ServerError::BadRequest("invalid parent id".into()))?,
                );
            }
            "location" => {
                let raw = field.text().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read location: {e}"))
                })?;
                let location: Location = serde_json::from_str(&raw)
                    .map_err(|e| ServerError::BadRequest(format!("invalid location: {e}")))?;
                draft.location = Some(location);
            }
            "file" => {
                let filename = field.file_name().unwrap_or("attachment").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read attachment: {e}"))
                })?;
                let blob_id = state.attachments.store(&data).await?;
                draft.attachment = Some(Attachment {
                    url: format!("/api/v1/blob/{blob_id}"),
                    filename,
                    content_type,
                });
            }
            _ => {}
        }
    }

    Ok(Json(state.service.send_message(id, me, draft).await?))
}

#[derive(Serialize)]
struct ClearRoomResponse {
    cleared: usize,
}

async fn clear_room(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<ClearRoomResponse>, ServerError> {
    let cleared = state.service.clear_room(id, me).await?;
    Ok(Json(ClearRoomResponse { cleared }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnreadEntry {
    room_id: RoomId,
    count: i64,
}

async fn unread_counts(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UnreadEntry>>, ServerError> {
    let db = state.store.lock().await;
    let entries = db
        .unread_counts(me)?
        .into_iter()
        .map(|(room_id, count)| UnreadEntry { room_id, count })
        .collect();
    Ok(Json(entries))
}

#[derive(Deserialize)]
struct EditMessageRequest {
    text: String,
}

async fn edit_message(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<MessageView>, ServerError> {
    Ok(Json(state.service.edit_message(id, me, &req.text).await?))
}

async fn delete_message_for_me(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.service.delete_for_me(id, me).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn delete_message_for_everyone(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path((room_id, id)): Path<(RoomId, MessageId)>,
) -> Result<Json<serde_json::Value>, ServerError> {
    {
        let db = state.store.lock().await;
        let message = db.get_message(id)?;
        if message.room_id != room_id {
            return Err(ChatError::NotFound("Message").into());
        }
    }
    state.service.delete_for_everyone(id, me).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Deserialize)]
struct ReactionRequest {
    emoji: String,
}

async fn set_reaction(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<MessageView>, ServerError> {
    Ok(Json(state.service.react(id, me, &req.emoji).await?))
}

async fn remove_reaction(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<Json<MessageView>, ServerError> {
    Ok(Json(state.service.remove_reaction(id, me).await?))
}

async fn star_message(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<Json<MessageView>, ServerError> {
    Ok(Json(state.service.star(id, me).await?))
}

async fn unstar_message(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<Json<MessageView>, ServerError> {
    Ok(Json(state.service.unstar(id, me).await?))
}

// ---- Scheduled messages ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateScheduledRequest {
    text: String,
    send_at: DateTime<Utc>,
    #[serde(default)]
    parent: Option<MessageId>,
}

async fn create_scheduled(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
    Json(req): Json<CreateScheduledRequest>,
) -> Result<Json<ScheduledMessage>, ServerError> {
    let scheduled = state
        .service
        .create_scheduled(id, me, &req.text, req.parent, req.send_at)
        .await?;
    Ok(Json(scheduled))
}

async fn list_scheduled(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Vec<ScheduledMessage>>, ServerError> {
    Ok(Json(state.service.list_scheduled(id, me).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateScheduledRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    send_at: Option<DateTime<Utc>>,
}

async fn update_scheduled(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<ScheduleId>,
    Json(req): Json<UpdateScheduledRequest>,
) -> Result<Json<ScheduledMessage>, ServerError> {
    let scheduled = state
        .service
        .update_scheduled(id, me, req.text.as_deref(), req.send_at)
        .await?;
    Ok(Json(scheduled))
}

async fn cancel_scheduled(
    AuthUser(me): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<ScheduleId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.service.cancel_scheduled(id, me).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

// ---- Attachments ----

async fn blob_upload(
    AuthUser(_me): AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Attachment>, ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("attachment").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {e}")))?;

            let id = state.attachments.store(&data).await?;
            info!(id = %id, size = data.len(), "Attachment uploaded");

            return Ok(Json(Attachment {
                url: format!("/api/v1/blob/{id}"),
                filename,
                content_type,
            }));
        }
    }

    Err(ServerError::BadRequest(
        "Missing 'file' field in multipart form".to_string(),
    ))
}

async fn blob_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<([(header::HeaderName, &'static str); 1], Vec<u8>), ServerError> {
    let data = state.attachments.get(id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
