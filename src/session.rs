use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppResult;

pub const IDENTITY: &str = "identity";

/// The authenticated identity carried by a session cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIdentity {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub username: String,
}

pub async fn current(session: &Session) -> AppResult<Option<SessionIdentity>> {
    Ok(session.get(IDENTITY).await?)
}

/// Binds `identity` to a fresh session id.
pub async fn start(session: &Session, identity: SessionIdentity) -> AppResult<()> {
    session.cycle_id().await?;
    session.insert(IDENTITY, identity).await?;
    Ok(())
}
