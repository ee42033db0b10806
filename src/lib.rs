pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod res;
pub mod rooms;
pub mod session;

use axum::{
    debug_handler,
    extract::FromRef,
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

use config::Config;
use db::Db;
use rooms::{Hub, Presence};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db: Db,
    pub credentials: auth::Credentials,
    pub presence: Presence,
    pub hub: Hub,
}

impl AppState {
    pub fn new(db: Db, credentials: auth::Credentials) -> AppState {
        AppState {
            db,
            credentials,
            presence: Presence::default(),
            hub: Hub::default(),
        }
    }
}

/// The full HTTP + websocket surface with sessions and CORS applied.
pub fn app(state: AppState, config: &Config) -> anyhow::Result<Router> {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.session_secure)
        .with_same_site(if config.session_secure { SameSite::None } else { SameSite::Lax })
        .with_expiry(Expiry::OnInactivity(config.session_inactivity));

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.cors_origin)?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/test", get(test))

        .merge(auth::router())
        .merge(rooms::router())

        .with_state(state)
        .layer(session_layer)
        .layer(cors))
}

#[debug_handler]
async fn test() -> Json<&'static str> {
    Json("test ok")
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "err": "Internal Server Error", "status": false })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
