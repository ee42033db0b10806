use axum::{debug_handler, extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use tower_sessions::Session;

use crate::{db::Db, session::{self, SessionIdentity}, AppResult, AppState};

use super::{find_by_username, register::CredentialsBody, Credentials};

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db): State<Db>,
    State(credentials): State<Credentials>,
    session: Session,

    Json(CredentialsBody { username, password }): Json<CredentialsBody>,
) -> AppResult<Response> {
    let unauthorized = (StatusCode::BAD_REQUEST, Json(json!({ "error": "unauthorized" }))).into_response();

    let Some(identity) = find_by_username(&db, &username).await? else {
        return Ok(unauthorized);
    };
    if !credentials.verify(&password, &identity.password_hash).await? {
        return Ok(unauthorized);
    }

    tracing::info!(%username, user_id = %identity.id, "logged in");
    session::start(&session, SessionIdentity { user_id: identity.id, username: identity.username }).await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": identity.id }))).into_response())
}

#[debug_handler]
pub(crate) async fn logout(
    session: Session
) -> AppResult<Json<serde_json::Value>> {
    session.flush().await?;
    Ok(Json(json!({ "status": true })))
}
