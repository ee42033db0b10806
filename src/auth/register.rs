use axum::{debug_handler, extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use crate::{db::Db, session::{self, SessionIdentity}, AppResult, AppState};

use super::{create_identity, Credentials};

#[derive(Deserialize)]
pub(crate) struct CredentialsBody {
    pub(crate) username: String,
    pub(crate) password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(db): State<Db>,
    State(credentials): State<Credentials>,
    session: Session,

    Json(CredentialsBody { username, password }): Json<CredentialsBody>,
) -> AppResult<Response> {
    let username = username.trim().to_owned();
    if username.is_empty() || password.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({ "error": "username and password are required" }))).into_response());
    }

    let user_id = match create_identity(&db, &credentials, &username, &password).await {
        Ok(user_id) => user_id,
        Err(err) => {
            tracing::warn!(%username, error = %err, "registration failed");
            return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Registration failed" }))).into_response());
        }
    };

    tracing::info!(%username, %user_id, "registered");
    session::start(&session, SessionIdentity { user_id, username }).await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": user_id }))).into_response())
}
