use axum::{routing::{get, post}, Router};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::{
    db::{self, Db, Identity, IdentityView},
    error::{is_unique_violation, ChatError, ChatResult},
    AppState,
};

mod login;
mod profile;
mod register;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register::register))
        .route("/login", post(login::login))
        .route("/logout", get(login::logout))
        .route("/profile", get(profile::profile))
}

/// bcrypt hashing, run off the async workers.
#[derive(Clone)]
pub struct Credentials {
    cost: u32,
}

impl Credentials {
    pub fn new(cost: u32) -> Credentials {
        Credentials { cost }
    }

    pub async fn hash(&self, secret: &str) -> ChatResult<String> {
        let secret = secret.to_owned();
        let cost = self.cost;
        Ok(tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost)).await??)
    }

    pub async fn verify(&self, secret: &str, hash: &str) -> ChatResult<bool> {
        let secret = secret.to_owned();
        let hash = hash.to_owned();
        Ok(tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash)).await??)
    }
}

pub async fn create_identity(db: &Db, credentials: &Credentials, username: &str, password: &str) -> ChatResult<Uuid> {
    let password_hash = credentials.hash(password).await?;
    let id = Uuid::now_v7();
    db.run(insert_identity(db.pool(), id, username, &password_hash)).await?;
    Ok(id)
}

async fn insert_identity(pool: &SqlitePool, id: Uuid, username: &str, password_hash: &str) -> ChatResult<()> {
    let inserted = sqlx::query("INSERT INTO identities (id,username,password_hash,active,created_at) VALUES (?,?,?,1,?)")
        .bind(id.to_string())
        .bind(username)
        .bind(password_hash)
        .bind(db::now_millis())
        .execute(pool)
        .await;

    match inserted {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(ChatError::AlreadyExists),
        Err(err) => Err(err.into()),
    }
}

pub async fn find_by_username(db: &Db, username: &str) -> ChatResult<Option<Identity>> {
    let row = db
        .run(
            sqlx::query("SELECT id,username,password_hash,active FROM identities WHERE username=?")
                .bind(username)
                .fetch_optional(db.pool()),
        )
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(Identity {
        id: db::stored_id(row.try_get::<String, _>("id")?.as_str())?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        active: row.try_get("active")?,
    }))
}

pub async fn find_identity(db: &Db, id: Uuid) -> ChatResult<Option<IdentityView>> {
    db.run(
        sqlx::query_as::<_, (String, String, bool)>("SELECT id,username,active FROM identities WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(db.pool()),
    )
    .await?
    .map(db::identity_view)
    .transpose()
}

pub async fn identity_exists(db: &Db, id: Uuid) -> ChatResult<bool> {
    Ok(db
        .run(
            sqlx::query("SELECT 1 FROM identities WHERE id=?")
                .bind(id.to_string())
                .fetch_optional(db.pool()),
        )
        .await?
        .is_some())
}

#[cfg(test)]
pub(crate) fn test_credentials() -> Credentials {
    // bcrypt's floor
    Credentials::new(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn hashes_verify() {
        let credentials = test_credentials();
        let hash = credentials.hash("pw1").await.unwrap();
        assert_ne!(hash, "pw1");
        assert!(credentials.verify("pw1", &hash).await.unwrap());
        assert!(!credentials.verify("pw2", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let db = test_db().await;
        let credentials = test_credentials();

        let id = create_identity(&db, &credentials, "ana", "pw").await.unwrap();
        assert!(matches!(
            create_identity(&db, &credentials, "ana", "other").await,
            Err(ChatError::AlreadyExists)
        ));

        let found = find_by_username(&db, "ana").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(found.active);
        assert!(identity_exists(&db, id).await.unwrap());
        assert!(!identity_exists(&db, Uuid::now_v7()).await.unwrap());
    }

    #[tokio::test]
    async fn identity_view_hides_hash() {
        let db = test_db().await;
        let id = create_identity(&db, &test_credentials(), "bo", "pw").await.unwrap();

        let view = find_identity(&db, id).await.unwrap().unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["username"], "bo");
        assert_eq!(json["_id"], id.to_string());
        assert!(json.get("password_hash").is_none());
    }
}
