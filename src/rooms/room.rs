use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::json;

use crate::{db::Db, error::{parse_id, ChatError}, AppResult, AppState};

use super::{directory, msg};

#[derive(Deserialize)]
pub(crate) struct MessagesQuery {
    #[serde(rename = "roomId")]
    room_id: String,
}

#[derive(Deserialize)]
pub(crate) struct LeaveQuery {
    #[serde(rename = "userId")]
    user_id: String,
}

fn invalid_id() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "err": "Invalid ID format", "status": false }))).into_response()
}

fn room_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "err": "Room not Found", "status": false }))).into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    Query(MessagesQuery { room_id }): Query<MessagesQuery>,
    State(db): State<Db>,
) -> AppResult<Response> {
    let Ok(room_id) = parse_id(&room_id) else {
        return Ok(invalid_id());
    };

    Ok(Json(msg::list_for_room(&db, room_id).await?).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_room(
    Path(room_id): Path<String>,
    State(db): State<Db>,
) -> AppResult<Response> {
    let Ok(room_id) = parse_id(&room_id) else {
        return Ok(invalid_id());
    };

    match directory::delete(&db, room_id).await {
        Ok(()) => Ok(Json(json!({ "status": true, "message": "Room deleted successfully" })).into_response()),
        Err(ChatError::NotFound) => Ok(room_not_found()),
        Err(err) => Err(err.into()),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn leave_room(
    Path(room_id): Path<String>,
    Query(LeaveQuery { user_id }): Query<LeaveQuery>,
    State(db): State<Db>,
) -> AppResult<Response> {
    let (Ok(room_id), Ok(user_id)) = (parse_id(&room_id), parse_id(&user_id)) else {
        return Ok(invalid_id());
    };

    match directory::leave(&db, room_id, user_id).await {
        Ok(()) => Ok(Json(json!({ "status": true, "message": "Left the room successfully" })).into_response()),
        Err(ChatError::NotFound) => Ok(room_not_found()),
        Err(err) => Err(err.into()),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn rooms_for_identity(
    Path(user_id): Path<String>,
    State(db): State<Db>,
) -> AppResult<Response> {
    let Ok(user_id) = parse_id(&user_id) else {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({ "err": "Invalid User ID format" }))).into_response());
    };

    Ok(Json(directory::list_for_identity(&db, user_id).await?).into_response())
}
