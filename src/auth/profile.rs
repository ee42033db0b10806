use axum::{debug_handler, http::StatusCode, response::{IntoResponse, Response}, Json};
use tower_sessions::Session;

use crate::{session, AppResult};

#[debug_handler]
pub(crate) async fn profile(
    session: Session,
) -> AppResult<Response> {
    let Some(identity) = session::current(&session).await? else {
        return Ok((StatusCode::UNAUTHORIZED, Json("no token")).into_response());
    };

    Ok(Json(identity).into_response())
}
