use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    auth::{self, Credentials},
    db::{self, Db, IdentityView, Room, RoomMembers},
    error::{is_unique_violation, ChatError, ChatResult},
};

/// Creates a room owned (member and admin) by `owner`.
///
/// The name lookup is only a fast path; uniqueness is decided by the
/// `UNIQUE(name)` constraint, so two racing creates yield one room.
pub async fn create(db: &Db, credentials: &Credentials, name: &str, password: &str, owner: Uuid) -> ChatResult<Uuid> {
    if find_by_name(db, name).await?.is_some() {
        return Err(ChatError::AlreadyExists);
    }

    let password_hash = credentials.hash(password).await?;
    let id = Uuid::now_v7();
    db.run(insert_room(db.pool(), id, name, &password_hash, owner)).await?;

    tracing::info!(room = %id, name, %owner, "room created");
    Ok(id)
}

async fn insert_room(pool: &SqlitePool, id: Uuid, name: &str, password_hash: &str, owner: Uuid) -> ChatResult<()> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query("INSERT INTO rooms (id,name,password_hash,created_at) VALUES (?,?,?,?)")
        .bind(id.to_string())
        .bind(name)
        .bind(password_hash)
        .bind(db::now_millis())
        .execute(&mut *tx)
        .await;
    if let Err(err) = inserted {
        return Err(if is_unique_violation(&err) { ChatError::AlreadyExists } else { err.into() });
    }

    sqlx::query("INSERT INTO room_members (room_id,identity_id) VALUES (?,?)")
        .bind(id.to_string())
        .bind(owner.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO room_admins (room_id,identity_id) VALUES (?,?)")
        .bind(id.to_string())
        .bind(owner.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Validates room, credential and identity, in that order, then adds the
/// identity to the member set if it is not there yet.
pub async fn join(db: &Db, credentials: &Credentials, name: &str, password: &str, identity: Uuid) -> ChatResult<RoomMembers> {
    let room = find_by_name(db, name).await?.ok_or(ChatError::NotFound)?;

    if !credentials.verify(password, &room.password_hash).await? {
        return Err(ChatError::Unauthorized);
    }
    if !auth::identity_exists(db, identity).await? {
        return Err(ChatError::UnknownIdentity);
    }

    add_member(db, room.id, identity).await?;

    Ok(RoomMembers {
        id: room.id,
        members: members(db, room.id).await?,
        name: room.name,
    })
}

/// Inserts the membership only while the room still exists, so a room deleted
/// after the lookup in `join` leaves no orphan row behind.
pub(crate) async fn add_member(db: &Db, room_id: Uuid, identity: Uuid) -> ChatResult<()> {
    let inserted = db
        .run(
            sqlx::query(
                "INSERT OR IGNORE INTO room_members (room_id,identity_id) \
                 SELECT ?,? WHERE EXISTS (SELECT 1 FROM rooms WHERE id=?)",
            )
            .bind(room_id.to_string())
            .bind(identity.to_string())
            .bind(room_id.to_string())
            .execute(db.pool()),
        )
        .await?
        .rows_affected();

    if inserted == 0 && !is_member(db, room_id, identity).await? {
        return Err(ChatError::NotFound);
    }
    Ok(())
}

async fn is_member(db: &Db, room_id: Uuid, identity: Uuid) -> ChatResult<bool> {
    Ok(db
        .run(
            sqlx::query("SELECT 1 FROM room_members WHERE room_id=? AND identity_id=?")
                .bind(room_id.to_string())
                .bind(identity.to_string())
                .fetch_optional(db.pool()),
        )
        .await?
        .is_some())
}

/// Removes a member. Leaving a room one is not in is a no-op, and an empty
/// room stays.
pub async fn leave(db: &Db, room_id: Uuid, identity: Uuid) -> ChatResult<()> {
    if !room_exists(db, room_id).await? {
        return Err(ChatError::NotFound);
    }

    db.run(
        sqlx::query("DELETE FROM room_members WHERE room_id=? AND identity_id=?")
            .bind(room_id.to_string())
            .bind(identity.to_string())
            .execute(db.pool()),
    )
    .await?;

    Ok(())
}

/// Deletes the room together with its messages, members and admins.
pub async fn delete(db: &Db, room_id: Uuid) -> ChatResult<()> {
    db.run(delete_cascade(db.pool(), room_id)).await?;
    tracing::info!(room = %room_id, "room deleted");
    Ok(())
}

async fn delete_cascade(pool: &SqlitePool, room_id: Uuid) -> ChatResult<()> {
    let room_id = room_id.to_string();
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM rooms WHERE id=?")
        .bind(&room_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(ChatError::NotFound);
    }

    for statement in [
        "DELETE FROM messages WHERE room_id=?",
        "DELETE FROM room_members WHERE room_id=?",
        "DELETE FROM room_admins WHERE room_id=?",
    ] {
        sqlx::query(statement).bind(&room_id).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn list_for_identity(db: &Db, identity: Uuid) -> ChatResult<Vec<Room>> {
    let rows: Vec<(String, String, String)> = db
        .run(
            sqlx::query_as(
                "SELECT r.id,r.name,r.password_hash FROM rooms r \
                 JOIN room_members m ON m.room_id=r.id \
                 WHERE m.identity_id=? ORDER BY r.created_at,r.id",
            )
            .bind(identity.to_string())
            .fetch_all(db.pool()),
        )
        .await?;

    let mut rooms = Vec::with_capacity(rows.len());
    for row in rows {
        rooms.push(load_room(db, row).await?);
    }
    Ok(rooms)
}

pub async fn find_by_name(db: &Db, name: &str) -> ChatResult<Option<Room>> {
    let row: Option<(String, String, String)> = db
        .run(
            sqlx::query_as("SELECT id,name,password_hash FROM rooms WHERE name=?")
                .bind(name)
                .fetch_optional(db.pool()),
        )
        .await?;

    match row {
        Some(row) => Ok(Some(load_room(db, row).await?)),
        None => Ok(None),
    }
}

pub async fn find_by_id(db: &Db, room_id: Uuid) -> ChatResult<Option<Room>> {
    let row: Option<(String, String, String)> = db
        .run(
            sqlx::query_as("SELECT id,name,password_hash FROM rooms WHERE id=?")
                .bind(room_id.to_string())
                .fetch_optional(db.pool()),
        )
        .await?;

    match row {
        Some(row) => Ok(Some(load_room(db, row).await?)),
        None => Ok(None),
    }
}

pub async fn room_exists(db: &Db, room_id: Uuid) -> ChatResult<bool> {
    Ok(db
        .run(
            sqlx::query("SELECT 1 FROM rooms WHERE id=?")
                .bind(room_id.to_string())
                .fetch_optional(db.pool()),
        )
        .await?
        .is_some())
}

/// Members resolved to identity records, in the order they joined.
pub async fn members(db: &Db, room_id: Uuid) -> ChatResult<Vec<IdentityView>> {
    let rows: Vec<(String, String, bool)> = db
        .run(
            sqlx::query_as(
                "SELECT i.id,i.username,i.active FROM room_members m \
                 JOIN identities i ON i.id=m.identity_id \
                 WHERE m.room_id=? ORDER BY m.rowid",
            )
            .bind(room_id.to_string())
            .fetch_all(db.pool()),
        )
        .await?;

    rows.into_iter().map(db::identity_view).collect()
}

async fn load_room(db: &Db, (id, name, password_hash): (String, String, String)) -> ChatResult<Room> {
    let id = db::stored_id(&id)?;
    Ok(Room {
        id,
        name,
        password_hash,
        members: member_ids(db, "SELECT identity_id FROM room_members WHERE room_id=? ORDER BY rowid", id).await?,
        admins: member_ids(db, "SELECT identity_id FROM room_admins WHERE room_id=? ORDER BY rowid", id).await?,
    })
}

async fn member_ids(db: &Db, query: &'static str, room_id: Uuid) -> ChatResult<Vec<Uuid>> {
    let rows: Vec<(String,)> = db
        .run(sqlx::query_as(query).bind(room_id.to_string()).fetch_all(db.pool()))
        .await?;

    rows.iter().map(|(id,)| db::stored_id(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::test_credentials, db::test_db, rooms::msg};

    async fn identity(db: &Db, username: &str) -> Uuid {
        auth::create_identity(db, &test_credentials(), username, "secret").await.unwrap()
    }

    async fn room_count(db: &Db, name: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms WHERE name=?")
            .bind(name)
            .fetch_one(db.pool())
            .await
            .unwrap();
        count
    }

    fn usernames(room: &RoomMembers) -> Vec<&str> {
        room.members.iter().map(|m| m.username.as_str()).collect()
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let db = test_db().await;
        let credentials = test_credentials();
        let owner = identity(&db, "u1").await;

        create(&db, &credentials, "alpha", "pw1", owner).await.unwrap();
        let second = create(&db, &credentials, "alpha", "pw2", owner).await;

        assert!(matches!(second, Err(ChatError::AlreadyExists)));
        assert_eq!(room_count(&db, "alpha").await, 1);
    }

    #[tokio::test]
    async fn concurrent_creates_leave_one_room() {
        let db = test_db().await;
        let credentials = test_credentials();
        let owner = identity(&db, "u1").await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (db, credentials) = (db.clone(), credentials.clone());
                tokio::spawn(async move { create(&db, &credentials, "alpha", "pw1", owner).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(ChatError::AlreadyExists) => {}
                Err(err) => panic!("unexpected error: {err}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(room_count(&db, "alpha").await, 1);
    }

    #[tokio::test]
    async fn owner_is_member_and_admin() {
        let db = test_db().await;
        let owner = identity(&db, "u1").await;
        let id = create(&db, &test_credentials(), "alpha", "pw1", owner).await.unwrap();

        let room = find_by_id(&db, id).await.unwrap().unwrap();
        assert_eq!(room.name, "alpha");
        assert_eq!(room.members, vec![owner]);
        assert_eq!(room.admins, vec![owner]);
        assert_ne!(room.password_hash, "pw1");
    }

    #[tokio::test]
    async fn join_scenario() {
        let db = test_db().await;
        let credentials = test_credentials();
        let u1 = identity(&db, "u1").await;
        let u2 = identity(&db, "u2").await;
        let id = create(&db, &credentials, "alpha", "pw1", u1).await.unwrap();

        let joined = join(&db, &credentials, "alpha", "pw1", u1).await.unwrap();
        assert_eq!(joined.id, id);
        assert_eq!(usernames(&joined), vec!["u1"]);

        let wrong = join(&db, &credentials, "alpha", "nope", u2).await;
        assert!(matches!(wrong, Err(ChatError::Unauthorized)));
        let current: Vec<String> = members(&db, id).await.unwrap().into_iter().map(|m| m.username).collect();
        assert_eq!(current, vec!["u1"]);

        let joined = join(&db, &credentials, "alpha", "pw1", u2).await.unwrap();
        assert_eq!(usernames(&joined), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let db = test_db().await;
        let credentials = test_credentials();
        let u1 = identity(&db, "u1").await;
        let u2 = identity(&db, "u2").await;
        let id = create(&db, &credentials, "alpha", "pw1", u1).await.unwrap();

        join(&db, &credentials, "alpha", "pw1", u2).await.unwrap();
        join(&db, &credentials, "alpha", "pw1", u2).await.unwrap();

        let room = find_by_id(&db, id).await.unwrap().unwrap();
        assert_eq!(room.members.iter().filter(|m| **m == u2).count(), 1);
        assert_eq!(room.members, vec![u1, u2]);
    }

    #[tokio::test]
    async fn membership_needs_a_live_room() {
        let db = test_db().await;
        let credentials = test_credentials();
        let u1 = identity(&db, "u1").await;
        let u2 = identity(&db, "u2").await;
        let id = create(&db, &credentials, "alpha", "pw1", u1).await.unwrap();

        // the owner is already in, so a repeat is not an error
        add_member(&db, id, u1).await.unwrap();

        // room gone between the join lookup and the insert
        delete(&db, id).await.unwrap();
        assert!(matches!(add_member(&db, id, u2).await, Err(ChatError::NotFound)));

        let (orphans,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM room_members WHERE room_id=?")
            .bind(id.to_string())
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn join_validation_order() {
        let db = test_db().await;
        let credentials = test_credentials();
        let u1 = identity(&db, "u1").await;
        create(&db, &credentials, "alpha", "pw1", u1).await.unwrap();

        let ghost = Uuid::now_v7();
        assert!(matches!(join(&db, &credentials, "beta", "pw1", ghost).await, Err(ChatError::NotFound)));
        assert!(matches!(join(&db, &credentials, "alpha", "bad", ghost).await, Err(ChatError::Unauthorized)));
        assert!(matches!(join(&db, &credentials, "alpha", "pw1", ghost).await, Err(ChatError::UnknownIdentity)));
    }

    #[tokio::test]
    async fn leave_then_join_restores_membership() {
        let db = test_db().await;
        let credentials = test_credentials();
        let u1 = identity(&db, "u1").await;
        let u2 = identity(&db, "u2").await;
        let id = create(&db, &credentials, "alpha", "pw1", u1).await.unwrap();
        join(&db, &credentials, "alpha", "pw1", u2).await.unwrap();

        leave(&db, id, u2).await.unwrap();
        assert_eq!(find_by_id(&db, id).await.unwrap().unwrap().members, vec![u1]);

        // not a member any more
        leave(&db, id, u2).await.unwrap();
        assert_eq!(find_by_id(&db, id).await.unwrap().unwrap().members, vec![u1]);

        join(&db, &credentials, "alpha", "pw1", u2).await.unwrap();
        assert_eq!(find_by_id(&db, id).await.unwrap().unwrap().members, vec![u1, u2]);
    }

    #[tokio::test]
    async fn empty_room_survives_leave() {
        let db = test_db().await;
        let u1 = identity(&db, "u1").await;
        let id = create(&db, &test_credentials(), "alpha", "pw1", u1).await.unwrap();

        leave(&db, id, u1).await.unwrap();

        let room = find_by_id(&db, id).await.unwrap().unwrap();
        assert!(room.members.is_empty());
        assert_eq!(room.admins, vec![u1]);
        assert!(matches!(leave(&db, Uuid::now_v7(), u1).await, Err(ChatError::NotFound)));
    }

    #[tokio::test]
    async fn delete_cascades_to_own_messages_only() {
        let db = test_db().await;
        let credentials = test_credentials();
        let u1 = identity(&db, "u1").await;
        let alpha = create(&db, &credentials, "alpha", "pw", u1).await.unwrap();
        let beta = create(&db, &credentials, "beta", "pw", u1).await.unwrap();

        for content in ["one", "two"] {
            msg::send(&db, content, alpha, u1).await.unwrap();
        }
        msg::send(&db, "keep", beta, u1).await.unwrap();

        delete(&db, alpha).await.unwrap();

        assert!(find_by_id(&db, alpha).await.unwrap().is_none());
        assert!(msg::list_for_room(&db, alpha).await.unwrap().is_empty());
        let kept = msg::list_for_room(&db, beta).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].content, "keep");

        assert!(matches!(delete(&db, alpha).await, Err(ChatError::NotFound)));
        assert!(list_for_identity(&db, u1).await.unwrap().iter().all(|room| room.id != alpha));
    }

    #[tokio::test]
    async fn lists_rooms_by_membership() {
        let db = test_db().await;
        let credentials = test_credentials();
        let u1 = identity(&db, "u1").await;
        let u2 = identity(&db, "u2").await;
        create(&db, &credentials, "alpha", "pw", u1).await.unwrap();
        create(&db, &credentials, "beta", "pw", u2).await.unwrap();
        join(&db, &credentials, "beta", "pw", u1).await.unwrap();

        let names: Vec<String> = list_for_identity(&db, u1).await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        let names: Vec<String> = list_for_identity(&db, u2).await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["beta"]);
    }
}
