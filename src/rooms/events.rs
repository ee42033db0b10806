//! Websocket frames. Both directions are `{"event": name, "data": payload}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{MessageView, RoomMembers};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Inbound {
    #[serde(rename = "create_room")]
    CreateRoom(RoomCredentials),
    #[serde(rename = "join_room")]
    JoinRoom(RoomCredentials),
    #[serde(rename = "join_existing_room")]
    JoinExistingRoom(ExistingRoom),
    #[serde(rename = "send_message")]
    SendMessage(OutgoingMessage),
    #[serde(rename = "user-joined")]
    UserJoined(Announce),
    #[serde(rename = "user-left")]
    UserLeft(Announce),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomCredentials {
    pub roomname: String,
    pub password: String,
    pub userid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExistingRoom {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingMessage {
    pub message: String,
    pub roomid: String,
    /// Sender identity.
    pub id: String,
}

/// `roomId` names a channel here, not necessarily a stored room.
#[derive(Debug, Clone, Deserialize)]
pub struct Announce {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum Outbound {
    #[serde(rename = "roomCreated")]
    RoomCreated(RoomStatus),
    #[serde(rename = "members")]
    Members(RoomMembers),
    #[serde(rename = "roomjoined")]
    RoomJoined(RoomStatus),
    #[serde(rename = "err")]
    Err(String),
    #[serde(rename = "get_message")]
    GetMessage(MessageView),
    #[serde(rename = "joined")]
    Joined(PresenceUpdate),
    #[serde(rename = "left")]
    Left(PresenceUpdate),
    #[serde(rename = "user-joined-announcement")]
    UserJoinedAnnouncement(Announcement),
    #[serde(rename = "user-left-announcement")]
    UserLeftAnnouncement(Announcement),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomStatus {
    pub status: bool,
    #[serde(rename = "roomId", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoomStatus {
    pub fn ok(room_id: Uuid) -> RoomStatus {
        RoomStatus { status: true, room_id: Some(room_id), error: None }
    }

    pub fn failed(error: &str) -> RoomStatus {
        RoomStatus { status: false, room_id: None, error: Some(error.to_owned()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceUpdate {
    pub status: bool,
    pub user: String,
    #[serde(rename = "onlineUsers")]
    pub online_users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Announcement {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_inbound_frames() {
        let frame = json!({
            "event": "join_existing_room",
            "data": { "roomId": "r1", "username": "ana" }
        });
        match serde_json::from_value::<Inbound>(frame).unwrap() {
            Inbound::JoinExistingRoom(ExistingRoom { room_id, username }) => {
                assert_eq!(room_id, "r1");
                assert_eq!(username, "ana");
            }
            other => panic!("unexpected {other:?}"),
        }

        let frame = json!({ "event": "user-left", "data": { "roomId": "r1", "userId": "u1" } });
        assert!(matches!(serde_json::from_value::<Inbound>(frame).unwrap(), Inbound::UserLeft(_)));
    }

    #[test]
    fn rejects_unknown_events() {
        let frame = json!({ "event": "edit_message", "data": {} });
        assert!(serde_json::from_value::<Inbound>(frame).is_err());
    }

    #[test]
    fn outbound_shapes() {
        let id = Uuid::now_v7();
        assert_eq!(
            serde_json::to_value(Outbound::RoomCreated(RoomStatus::ok(id))).unwrap(),
            json!({ "event": "roomCreated", "data": { "status": true, "roomId": id.to_string() } })
        );
        assert_eq!(
            serde_json::to_value(Outbound::RoomCreated(RoomStatus::failed("Room already exists"))).unwrap(),
            json!({ "event": "roomCreated", "data": { "status": false, "error": "Room already exists" } })
        );
        assert_eq!(
            serde_json::to_value(Outbound::Err("User not found".into())).unwrap(),
            json!({ "event": "err", "data": "User not found" })
        );
        assert_eq!(
            serde_json::to_value(Outbound::Left(PresenceUpdate {
                status: true,
                user: "ana".into(),
                online_users: vec!["bo".into()],
            }))
            .unwrap(),
            json!({ "event": "left", "data": { "status": true, "user": "ana", "onlineUsers": ["bo"] } })
        );
    }
}
