use uuid::Uuid;

use crate::{
    auth,
    db::{self, Db, IdentityView, Message, MessageView, RoomRef},
    error::{ChatError, ChatResult},
};

/// Persists a message and returns it resolved for fan-out.
///
/// Room and sender are resolved before the insert so a message pointing at
/// nothing is never stored. Callers broadcast only on `Ok`.
pub async fn send(db: &Db, content: &str, room_id: Uuid, sender_id: Uuid) -> ChatResult<MessageView> {
    let room = room_ref(db, room_id).await?.ok_or(ChatError::NotFound)?;
    let sender = auth::find_identity(db, sender_id).await?.ok_or(ChatError::UnknownIdentity)?;

    let message = Message {
        id: Uuid::now_v7(),
        room_id,
        sender_id,
        content: content.to_owned(),
        created_at: db::now_millis(),
    };
    insert(db, &message).await?;

    Ok(MessageView {
        id: message.id,
        content: message.content,
        room,
        sender,
        timestamp: message.created_at,
    })
}

pub(crate) async fn insert(db: &Db, message: &Message) -> ChatResult<()> {
    db.run(
        sqlx::query("INSERT INTO messages (id,room_id,sender_id,content,created_at) VALUES (?,?,?,?,?)")
            .bind(message.id.to_string())
            .bind(message.room_id.to_string())
            .bind(message.sender_id.to_string())
            .bind(&message.content)
            .bind(message.created_at)
            .execute(db.pool()),
    )
    .await?;
    Ok(())
}

/// Oldest first.
pub async fn list_for_room(db: &Db, room_id: Uuid) -> ChatResult<Vec<MessageView>> {
    let rows: Vec<(String, String, i64, String, String, bool, String)> = db
        .run(
            sqlx::query_as(
                "SELECT m.id,m.content,m.created_at,i.id,i.username,i.active,r.name FROM messages m \
                 JOIN identities i ON i.id=m.sender_id \
                 JOIN rooms r ON r.id=m.room_id \
                 WHERE m.room_id=? ORDER BY m.created_at,m.id",
            )
            .bind(room_id.to_string())
            .fetch_all(db.pool()),
        )
        .await?;

    rows.into_iter()
        .map(|(id, content, created_at, sender_id, username, active, room_name)| -> ChatResult<MessageView> {
            Ok(MessageView {
                id: db::stored_id(&id)?,
                content,
                room: RoomRef { id: room_id, name: room_name },
                sender: IdentityView {
                    id: db::stored_id(&sender_id)?,
                    username,
                    active,
                },
                timestamp: created_at,
            })
        })
        .collect()
}

async fn room_ref(db: &Db, room_id: Uuid) -> ChatResult<Option<RoomRef>> {
    let row: Option<(String,)> = db
        .run(
            sqlx::query_as("SELECT name FROM rooms WHERE id=?")
                .bind(room_id.to_string())
                .fetch_optional(db.pool()),
        )
        .await?;

    Ok(row.map(|(name,)| RoomRef { id: room_id, name }))
}
