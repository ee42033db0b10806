pub mod directory;
pub mod dispatch;
pub mod events;
pub mod hub;
pub mod msg;
pub mod presence;
mod room;
mod ws;

use axum::{routing::{delete, get}, Router};

use crate::AppState;

pub use hub::{ConnId, Hub};
pub use presence::Presence;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(room::messages))
        .route("/delete/{roomid}", delete(room::delete_room))
        .route("/leave/{roomid}", get(room::leave_room))
        .route("/rooms/{userid}", get(room::rooms_for_identity))
        .route("/ws", get(ws::room_ws))
}
