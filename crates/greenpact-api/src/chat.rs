use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use greenpact_gateway::SessionUser;
use greenpact_gateway::relay::{EMPTY_MESSAGE, chat_history, chat_text, deliver_chat_message, unread_summary};
use greenpact_types::api::{ChatRoomView, CreateRoomRequest, CreateRoomResponse, NotificationView, SendChatRequest};
use greenpact_types::events::{Group, RelayEvent};

use crate::error::{ApiError, ApiResult, ValidJson};
use crate::state::AppState;
use crate::views;

async fn require_participant(state: &AppState, room: &str, user: &SessionUser) -> ApiResult<()> {
    let (name, user_id) = (room.to_string(), user.id);
    let member = state.store(move |db| db.is_participant(&name, user_id)).await?;
    if !member {
        // Rooms the caller is not in look the same as rooms that do not exist.
        return Err(ApiError::not_found("Room not found"));
    }
    Ok(())
}

pub async fn room_history(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(room): Path<String>,
) -> ApiResult<Json<Value>> {
    require_participant(&state, &room, &user).await?;
    let lines = chat_history(state.db(), &room).await?;
    Ok(Json(json!({ "data": lines })))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(room): Path<String>,
    ValidJson(req): ValidJson<SendChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = chat_text(&req.message).ok_or_else(|| ApiError::BadRequest(EMPTY_MESSAGE.into()))?;
    require_participant(&state, &room, &user).await?;
    let line = deliver_chat_message(state.db(), state.dispatcher(), &room, &user, message).await?;
    debug!("{} posted to room {} over HTTP", user.username, room);
    Ok((StatusCode::CREATED, Json(line)))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<Value>> {
    let user_id = user.id;
    let rows = state.store(move |db| db.list_rooms_for(user_id)).await?;
    let data: Vec<ChatRoomView> = rows.into_iter().map(|row| views::room(&state.media, row)).collect();
    Ok(Json(json!({ "data": data })))
}

/// Opens a two-party room with `username`, or hands back the one that
/// already exists between the pair.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<CreateRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req
        .username
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Username is required"))?;
    if username == user.username {
        return Err(ApiError::bad_request("You cannot start a chat with yourself"));
    }

    let caller = user.id;
    let (room, created) = state
        .store(move |db| {
            let Some(peer) = db.get_user_by_username(&username)? else {
                return Ok(None);
            };
            if let Some(existing) = db.find_room_between(caller, peer.id)? {
                return Ok(Some((existing, false)));
            }
            let room = db.create_room(&Uuid::new_v4().to_string(), &[caller, peer.id])?;
            Ok(Some((room, true)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let status = if created {
        info!("{} ({}) opened chat room {}", user.username, user.id, room.name);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(CreateRoomResponse { success: "Room Created".into(), name: room.name })))
}

pub async fn unread_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<Value>> {
    let user_id = user.id;
    let rows = state.store(move |db| db.list_unread_notifications(user_id)).await?;
    let notifications: Vec<NotificationView> = rows.into_iter().map(views::notification).collect();
    Ok(Json(json!({ "notifications": notifications })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let user_id = user.id;
    let found = state
        .store(move |db| match db.get_notification(id)? {
            Some(n) if n.recipient_id == user_id => {
                db.mark_notification_read(id)?;
                Ok(true)
            }
            _ => Ok(false),
        })
        .await?;
    if !found {
        return Err(ApiError::not_found("Notification not found"));
    }

    // Open notification channels follow the new counters.
    let summary = unread_summary(state.db(), user.id).await?;
    state
        .dispatcher()
        .publish(&Group::Notifications(user.username.clone()), RelayEvent::UnreadSummary(summary))
        .await;

    Ok(Json(json!({ "message": "Notification marked as read" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{account, app};
    use greenpact_types::models::Role;

    async fn room_for(state: &AppState, a: &SessionUser, b: &SessionUser) -> String {
        let req = CreateRoomRequest { username: Some(b.username.clone()) };
        create_room(State(state.clone()), Extension(a.clone()), ValidJson(req))
            .await
            .unwrap()
            .into_response();
        state.db().find_room_between(a.id, b.id).unwrap().unwrap().name
    }

    #[tokio::test]
    async fn a_pair_shares_one_room() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);
        let kiran = account(&app.state, "kiran", Role::Contractor, true);

        let first = room_for(&app.state, &ravi, &kiran).await;
        let second = room_for(&app.state, &kiran, &ravi).await;
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());

        let Json(rooms) = list_rooms(State(app.state.clone()), Extension(ravi.clone())).await.unwrap();
        assert_eq!(rooms["data"][0]["chat_user"], "kiran");
        assert_eq!(rooms["data"][0]["profile"]["name"], "kiran");
    }

    #[tokio::test]
    async fn rooms_need_a_known_other_user() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);

        let missing = CreateRoomRequest { username: Some("ghost".into()) };
        let err = create_room(State(app.state.clone()), Extension(ravi.clone()), ValidJson(missing)).await.err();
        assert!(matches!(err, Some(ApiError::NotFound(_))));

        let own = CreateRoomRequest { username: Some("ravi".into()) };
        let err = create_room(State(app.state.clone()), Extension(ravi.clone()), ValidJson(own)).await.err();
        assert!(matches!(err, Some(ApiError::BadRequest(_))));

        let empty = CreateRoomRequest { username: None };
        let err = create_room(State(app.state.clone()), Extension(ravi), ValidJson(empty)).await.err();
        assert!(matches!(err, Some(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn blank_messages_are_rejected_over_http() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);
        let kiran = account(&app.state, "kiran", Role::Contractor, true);
        let room = room_for(&app.state, &ravi, &kiran).await;

        let blank = SendChatRequest { message: "   ".into() };
        let err = send_message(State(app.state.clone()), Extension(ravi.clone()), Path(room.clone()), ValidJson(blank))
            .await
            .err();
        assert!(matches!(err, Some(ApiError::BadRequest(_))));

        let Json(history) = room_history(State(app.state.clone()), Extension(kiran), Path(room)).await.unwrap();
        assert_eq!(history["data"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn posting_notifies_the_other_side_until_marked_read() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);
        let kiran = account(&app.state, "kiran", Role::Contractor, true);
        let outsider = account(&app.state, "meena", Role::Farmer, true);
        let room = room_for(&app.state, &ravi, &kiran).await;

        let msg = SendChatRequest { message: "namaste".into() };
        send_message(State(app.state.clone()), Extension(ravi.clone()), Path(room.clone()), ValidJson(msg))
            .await
            .unwrap();

        let Json(history) =
            room_history(State(app.state.clone()), Extension(kiran.clone()), Path(room.clone())).await.unwrap();
        assert_eq!(history["data"][0]["username"], "ravi");
        assert_eq!(history["data"][0]["message"], "namaste");

        let err = room_history(State(app.state.clone()), Extension(outsider.clone()), Path(room.clone())).await.err();
        assert!(matches!(err, Some(ApiError::NotFound(_))));

        let Json(unread) = unread_notifications(State(app.state.clone()), Extension(kiran.clone())).await.unwrap();
        let id = unread["notifications"][0]["id"].as_i64().unwrap();
        assert_eq!(unread["notifications"][0]["sender"], "ravi");

        // Only the recipient can mark it.
        let err = mark_read(State(app.state.clone()), Extension(ravi.clone()), Path(id)).await.err();
        assert!(matches!(err, Some(ApiError::NotFound(_))));

        mark_read(State(app.state.clone()), Extension(kiran.clone()), Path(id)).await.unwrap();
        mark_read(State(app.state.clone()), Extension(kiran.clone()), Path(id)).await.unwrap();
        let Json(unread) = unread_notifications(State(app.state.clone()), Extension(kiran)).await.unwrap();
        assert_eq!(unread["notifications"].as_array().unwrap().len(), 0);
    }
}
