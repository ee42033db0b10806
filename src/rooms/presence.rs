use std::{collections::{hash_map::Entry, HashMap}, sync::Arc};

use tokio::sync::RwLock;

use super::hub::ConnId;

/// Who is online right now: username → the connection that announced them.
///
/// Lives for the process only and is never consulted for room membership.
#[derive(Clone, Default)]
pub struct Presence {
    online: Arc<RwLock<HashMap<String, ConnId>>>,
}

impl Presence {
    /// First writer wins: a username already bound to a live connection
    /// keeps it. Returns whether this call inserted.
    pub async fn register(&self, username: &str, conn: ConnId) -> bool {
        match self.online.write().await.entry(username.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(conn);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Drops every entry `conn` owns; one connection may have announced
    /// several usernames. Returns the removed names, sorted.
    pub async fn unregister_by_connection(&self, conn: ConnId) -> Vec<String> {
        let mut removed = Vec::new();
        self.online.write().await.retain(|username, owner| {
            if *owner == conn {
                removed.push(username.clone());
                false
            } else {
                true
            }
        });
        removed.sort();
        removed
    }

    /// Snapshot, sorted so every receiver of one broadcast sees the same list.
    pub async fn list_online(&self) -> Vec<String> {
        let mut names: Vec<String> = self.online.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
