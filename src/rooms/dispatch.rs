//! Connection manager: one handler per inbound event, each turning the
//! outcome of the directory, presence tracker or broadcaster into outbound
//! events. Storage errors are logged here and never reach the client.

use uuid::Uuid;

use crate::{
    db::{MessageView, RoomMembers},
    error::{parse_id, ChatError, ChatResult},
    AppState,
};

use super::{
    directory,
    events::{Announce, Announcement, ExistingRoom, Inbound, Outbound, OutgoingMessage, PresenceUpdate, RoomCredentials, RoomStatus},
    hub::ConnId,
    msg,
};

pub async fn dispatch(state: &AppState, conn: ConnId, event: Inbound) {
    match event {
        Inbound::CreateRoom(payload) => create_room(state, conn, payload).await,
        Inbound::JoinRoom(payload) => join_room(state, conn, payload).await,
        Inbound::JoinExistingRoom(payload) => join_existing_room(state, conn, payload).await,
        Inbound::SendMessage(payload) => send_message(state, conn, payload).await,
        Inbound::UserJoined(payload) => user_joined(state, conn, payload).await,
        Inbound::UserLeft(payload) => user_left(state, conn, payload).await,
    }
}

async fn create_room(state: &AppState, conn: ConnId, payload: RoomCredentials) {
    let status = match try_create_room(state, &payload).await {
        Ok(room_id) => {
            state.hub.subscribe(conn, &payload.roomname).await;
            RoomStatus::ok(room_id)
        }
        Err(ChatError::AlreadyExists) => RoomStatus::failed("Room already exists"),
        Err(err) => {
            tracing::error!(%conn, room = %payload.roomname, error = %err, "create_room failed");
            RoomStatus::failed("Server error")
        }
    };

    state.hub.emit(conn, Outbound::RoomCreated(status)).await;
}

async fn try_create_room(state: &AppState, payload: &RoomCredentials) -> ChatResult<Uuid> {
    let owner = parse_id(&payload.userid)?;
    directory::create(&state.db, &state.credentials, &payload.roomname, &payload.password, owner).await
}

async fn join_room(state: &AppState, conn: ConnId, payload: RoomCredentials) {
    match try_join_room(state, &payload).await {
        Ok(room) => {
            state.hub.subscribe(conn, &payload.roomname).await;
            tracing::debug!(%conn, room = %room.name, "joined room");

            let room_id = room.id;
            state.hub.emit(conn, Outbound::Members(room)).await;
            state.hub.emit(conn, Outbound::RoomJoined(RoomStatus::ok(room_id))).await;
        }
        Err(err) => {
            let reason = match err {
                ChatError::NotFound => "Room is not available",
                ChatError::Unauthorized => "Incorrect credentials",
                ChatError::UnknownIdentity => "User not found",
                ChatError::Validation(_) => "Invalid identifier",
                ref other => {
                    tracing::error!(%conn, room = %payload.roomname, error = %other, "join_room failed");
                    "Server error during join"
                }
            };
            state.hub.emit(conn, Outbound::Err(reason.to_owned())).await;
        }
    }
}

async fn try_join_room(state: &AppState, payload: &RoomCredentials) -> ChatResult<RoomMembers> {
    let identity = parse_id(&payload.userid)?;
    directory::join(&state.db, &state.credentials, &payload.roomname, &payload.password, identity).await
}

/// Re-enters a room the caller already belongs to. No credential check: the
/// caller's session is taken as proof of membership.
async fn join_existing_room(state: &AppState, conn: ConnId, payload: ExistingRoom) {
    let room = match reenter(state, &payload.room_id).await {
        Ok(room) => room,
        Err(err) => {
            let reason = match err {
                ChatError::NotFound => "Room not found",
                ChatError::Validation(_) => "Invalid identifier",
                ref other => {
                    tracing::error!(%conn, room = %payload.room_id, error = %other, "join_existing_room failed");
                    "Server error during re-entry"
                }
            };
            state.hub.emit(conn, Outbound::Err(reason.to_owned())).await;
            return;
        }
    };

    state.hub.subscribe(conn, &room.name).await;
    tracing::debug!(%conn, room = %room.name, "re-entered room");
    state.hub.emit(conn, Outbound::Members(room)).await;

    if state.presence.register(&payload.username, conn).await {
        tracing::info!(%conn, user = %payload.username, "online");
    }

    let online_users = state.presence.list_online().await;
    state
        .hub
        .to_all(Outbound::Joined(PresenceUpdate {
            status: true,
            user: payload.username,
            online_users,
        }))
        .await;
}

async fn reenter(state: &AppState, room_id: &str) -> ChatResult<RoomMembers> {
    let room_id = parse_id(room_id)?;
    let room = directory::find_by_id(&state.db, room_id).await?.ok_or(ChatError::NotFound)?;

    Ok(RoomMembers {
        id: room.id,
        members: directory::members(&state.db, room.id).await?,
        name: room.name,
    })
}

async fn send_message(state: &AppState, conn: ConnId, payload: OutgoingMessage) {
    match try_send(state, &payload).await {
        Ok(message) => {
            // channels are named after rooms, not their ids
            let channel = message.room.name.clone();
            state.hub.to_channel(&channel, Outbound::GetMessage(message)).await;
        }
        Err(err) => {
            let reason = match err {
                ChatError::NotFound => "Room not found",
                ChatError::UnknownIdentity => "User not found",
                ChatError::Validation(_) => "Invalid identifier",
                ref other => {
                    tracing::error!(%conn, room = %payload.roomid, error = %other, "send_message failed");
                    "Server error"
                }
            };
            state.hub.emit(conn, Outbound::Err(reason.to_owned())).await;
        }
    }
}

async fn try_send(state: &AppState, payload: &OutgoingMessage) -> ChatResult<MessageView> {
    let room_id = parse_id(&payload.roomid)?;
    let sender_id = parse_id(&payload.id)?;
    msg::send(&state.db, &payload.message, room_id, sender_id).await
}

async fn user_joined(state: &AppState, conn: ConnId, Announce { room_id, user_id }: Announce) {
    state.hub.subscribe(conn, &room_id).await;
    state
        .hub
        .to_channel_except(&room_id, conn, Outbound::UserJoinedAnnouncement(Announcement { user_id }))
        .await;
}

async fn user_left(state: &AppState, conn: ConnId, Announce { room_id, user_id }: Announce) {
    state.hub.unsubscribe(conn, &room_id).await;
    state
        .hub
        .to_channel_except(&room_id, conn, Outbound::UserLeftAnnouncement(Announcement { user_id }))
        .await;
}

/// Tears a connection down. Infallible, so it always completes; room
/// membership is left untouched. Each username the connection announced
/// gets its own `left`, all carrying the final online list.
pub async fn disconnect(state: &AppState, conn: ConnId) {
    state.hub.disconnect(conn).await;

    let gone = state.presence.unregister_by_connection(conn).await;
    if !gone.is_empty() {
        let online_users = state.presence.list_online().await;
        for user in gone {
            tracing::info!(%conn, %user, "offline");
            state
                .hub
                .to_all(Outbound::Left(PresenceUpdate {
                    status: true,
                    user,
                    online_users: online_users.clone(),
                }))
                .await;
        }
    }

    tracing::debug!(%conn, "connection closed");
}
