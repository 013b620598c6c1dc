use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Extension, Json, Router,
};
use futures_util::Stream;
use parkir_core::{Caller, Message, Room};
use parkir_shared::models::events::Notification;
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;
use crate::{error::AppError, sse::notification_stream, state::AppState};

#[derive(Debug, Deserialize)]
struct OpenRoomRequest {
    parking_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    content: String,
    client_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesParams {
    after: Option<u64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/rooms", get(my_rooms).post(open_room))
        .route("/v1/rooms/stream", get(room_updates))
        .route("/v1/rooms/{id}/messages", get(room_messages).post(send_message))
        .route("/v1/rooms/{id}/stream", get(message_stream))
}

async fn my_rooms(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> Result<Json<Vec<Room>>, AppError> {
    Ok(Json(state.chat.my_rooms(&caller).await?))
}

async fn open_room(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<OpenRoomRequest>,
) -> Result<Json<Room>, AppError> {
    Ok(Json(state.chat.open_room(&caller, req.parking_id).await?))
}

async fn room_messages(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Query(params): Query<MessagesParams>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(state.chat.room_messages(&caller, id, params.after).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let message = state
        .chat
        .send_message(&caller, id, &req.content, req.client_message_id.as_deref())
        .await?;
    Ok(Json(message))
}

/// Room list changes addressed to the caller.
async fn room_updates(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = caller.account_id;
    notification_stream(state.notifications.subscribe(), move |notification| {
        matches!(notification, Notification::RoomUpdated(event) if event.user_id == user_id)
    })
}

async fn message_stream(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe before the membership check so nothing sent in between is missed.
    let receiver = state.notifications.subscribe();
    state.chat.room_for_participant(&caller, id).await?;

    Ok(notification_stream(receiver, move |notification| {
        matches!(notification, Notification::MessageReceived(event) if event.room_id == id)
    }))
}
