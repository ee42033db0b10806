use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    RwLock,
};
use uuid::Uuid;

use super::events::Outbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> ConnId {
        ConnId(Uuid::now_v7())
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Events a connection may have queued before further ones are dropped.
pub const QUEUE_CAPACITY: usize = 64;

struct Link {
    tx: mpsc::Sender<Outbound>,
    channels: HashSet<String>,
}

/// Live connections and the channels each one is subscribed to.
///
/// Sends never block: every connection drains its own bounded queue in a
/// writer task. A slow reader whose queue is full misses events, and a queue
/// whose writer is gone just drops them.
#[derive(Clone)]
pub struct Hub {
    links: Arc<RwLock<HashMap<ConnId, Link>>>,
    capacity: usize,
}

impl Default for Hub {
    fn default() -> Hub {
        Hub::with_capacity(QUEUE_CAPACITY)
    }
}

impl Hub {
    pub fn with_capacity(capacity: usize) -> Hub {
        Hub {
            links: Arc::default(),
            capacity,
        }
    }

    pub async fn connect(&self) -> (ConnId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let conn = ConnId::new();
        self.links.write().await.insert(conn, Link { tx, channels: HashSet::new() });
        (conn, rx)
    }

    pub async fn disconnect(&self, conn: ConnId) {
        self.links.write().await.remove(&conn);
    }

    pub async fn subscribe(&self, conn: ConnId, channel: &str) {
        if let Some(link) = self.links.write().await.get_mut(&conn) {
            link.channels.insert(channel.to_owned());
        }
    }

    pub async fn unsubscribe(&self, conn: ConnId, channel: &str) {
        if let Some(link) = self.links.write().await.get_mut(&conn) {
            link.channels.remove(channel);
        }
    }

    #[cfg(test)]
    pub(crate) async fn channels(&self, conn: ConnId) -> HashSet<String> {
        self.links
            .read()
            .await
            .get(&conn)
            .map(|link| link.channels.clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) async fn connections(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn emit(&self, conn: ConnId, event: Outbound) {
        if let Some(link) = self.links.read().await.get(&conn) {
            deliver(conn, link, event);
        }
    }

    /// Every subscriber of `channel`, the sender included.
    pub async fn to_channel(&self, channel: &str, event: Outbound) {
        self.fan_out(|_, link| link.channels.contains(channel), event).await;
    }

    pub async fn to_channel_except(&self, channel: &str, except: ConnId, event: Outbound) {
        self.fan_out(|conn, link| conn != except && link.channels.contains(channel), event).await;
    }

    pub async fn to_all(&self, event: Outbound) {
        self.fan_out(|_, _| true, event).await;
    }

    async fn fan_out(&self, wants: impl Fn(ConnId, &Link) -> bool, event: Outbound) {
        for (conn, link) in self.links.read().await.iter() {
            if wants(*conn, link) {
                deliver(*conn, link, event.clone());
            }
        }
    }
}

fn deliver(conn: ConnId, link: &Link, event: Outbound) {
    if let Err(TrySendError::Full(_)) = link.tx.try_send(event) {
        tracing::warn!(%conn, "outbound queue full, event dropped");
    }
}
