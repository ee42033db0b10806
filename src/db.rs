use std::{future::Future, time::Duration};

use serde::Serialize;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use uuid::Uuid;

use crate::{error::{ChatError, ChatResult}, res};

// Stored entities hold references only; the *View types below are what
// reads resolve them into.

#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "roomName")]
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub members: Vec<Uuid>,
    pub admins: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomRef {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "roomName")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomMembers {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "roomName")]
    pub name: String,
    pub members: Vec<IdentityView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub content: String,
    pub room: RoomRef,
    pub sender: IdentityView,
    pub timestamp: i64,
}

/// Pool handle that puts a deadline on every storage call.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
    deadline: Duration,
}

impl Db {
    pub async fn connect(database_url: &str, max_connections: u32, deadline: Duration) -> Result<Db, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Db::with_schema(pool, deadline).await
    }

    /// Private database living as long as the returned handle. One connection
    /// that never idles out, since every sqlite memory connection is its own
    /// database.
    pub async fn in_memory(deadline: Duration) -> Result<Db, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Db::with_schema(pool, deadline).await
    }

    async fn with_schema(pool: SqlitePool, deadline: Duration) -> Result<Db, sqlx::Error> {
        sqlx::raw_sql(res::SCHEMA).execute(&pool).await?;
        Ok(Db { pool, deadline })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs one storage call; exceeding the deadline is a persistence failure.
    pub async fn run<T, E, F>(&self, call: F) -> ChatResult<T>
    where
        F: Future<Output = Result<T, E>>,
        ChatError: From<E>,
    {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result.map_err(ChatError::from),
            Err(_) => Err(ChatError::Persistence(format!(
                "storage call exceeded {}ms",
                self.deadline.as_millis()
            ))),
        }
    }
}

pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn identity_view((id, username, active): (String, String, bool)) -> ChatResult<IdentityView> {
    Ok(IdentityView {
        id: stored_id(&id)?,
        username,
        active,
    })
}

/// Ids written by this crate are always valid; anything else means the
/// database was edited by hand.
pub(crate) fn stored_id(raw: &str) -> ChatResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ChatError::Persistence(format!("corrupt id in storage: {raw}")))
}

#[cfg(test)]
pub(crate) async fn test_db() -> Db {
    Db::in_memory(Duration::from_secs(5)).await.unwrap()
}
