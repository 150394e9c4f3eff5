//! Message broadcast: per-node room channels and latency-simulated fan-out
//!
//! Every node owns an [`Endpoint`]: its local store plus one fan-out channel
//! per room it listens to. `send_message` persists for the sender first, then
//! delivers to each room peer independently after a random transport delay.

use crate::mesh::Mesh;
use crate::store::LocalStore;
use crate::types::Message;
use crate::validation::validate_message;
use crate::MeshError;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, warn};

/// Buffered messages per room channel before slow listeners start lagging
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Local state of one mesh node: its store and its room listeners
pub struct Endpoint {
    store: LocalStore,
    channels: Mutex<HashMap<String, broadcast::Sender<Message>>>,
}

impl Endpoint {
    pub(crate) fn new(store: LocalStore) -> Self {
        Self {
            store,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub(crate) fn subscribe(&self, room_id: &str) -> Subscription {
        let receiver = self
            .channels
            .lock()
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe();
        Subscription {
            room_id: room_id.to_string(),
            receiver,
        }
    }

    /// Persist, then wake every listener of the message's room.
    ///
    /// Concurrent deliveries to one endpoint take turns, so listeners see
    /// messages in the order they landed in history.
    pub(crate) fn deliver(&self, message: &Message) -> usize {
        let mut channels = self.channels.lock();
        self.store.append_room_message(&message.room_id, message);

        let Some(sender) = channels.get(&message.room_id) else {
            return 0;
        };
        match sender.send(message.clone()) {
            Ok(listeners) => listeners,
            Err(_) => {
                // Every listener unsubscribed
                channels.remove(&message.room_id);
                0
            }
        }
    }

    pub fn listener_count(&self, room_id: &str) -> usize {
        self.channels
            .lock()
            .get(room_id)
            .map_or(0, |s| s.receiver_count())
    }
}

/// A live listener on one room of one node. Dropping it unsubscribes.
pub struct Subscription {
    room_id: String,
    receiver: broadcast::Receiver<Message>,
}

impl Subscription {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next message; `None` once the node's endpoint is torn down
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Listener on {} lagged, skipped {} message(s)", self.room_id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<Message> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Listener on {} lagged, skipped {} message(s)", self.room_id, skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Remove exactly this listener
    pub fn unsubscribe(self) {}
}

impl Mesh {
    /// Store a new message for the sender, then fan it out to the room.
    ///
    /// Resolves only after every peer delivery finished.
    pub async fn send_message(
        &self,
        room_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message, MeshError> {
        validate_message(content).map_err(MeshError::InvalidInput)?;

        let sender = self
            .registry()
            .get(sender_id)
            .ok_or_else(|| MeshError::SenderNotRegistered(sender_id.to_string()))?;
        if !sender.is_in_room(room_id) {
            return Err(MeshError::NotInRoom(room_id.to_string()));
        }
        let endpoint = self
            .endpoint(sender_id)
            .ok_or_else(|| MeshError::SenderNotRegistered(sender_id.to_string()))?;

        let message = Message::text(room_id, &sender.id, &sender.username, content);
        endpoint.store().append_room_message(room_id, &message);

        let delivered = self.broadcast(&message).await;
        info!(
            "{} broadcast {} to {} peer(s) in {}",
            sender.username, message.id, delivered, room_id
        );
        Ok(message)
    }

    /// Deliver to every room member except the author; returns how many received it
    async fn broadcast(&self, message: &Message) -> usize {
        let peers: Vec<String> = self
            .registry()
            .room_members(&message.room_id)
            .into_iter()
            .filter(|n| n.id != message.user_id)
            .map(|n| n.id)
            .collect();

        let latency = self.config().broadcast_latency_ms.clone();
        let deliveries = peers.into_iter().map(|peer_id| {
            let delay = Duration::from_millis(rand::thread_rng().gen_range(latency.clone()));
            self.deliver_to_peer(peer_id, delay, message)
        });

        join_all(deliveries).await.into_iter().filter(|ok| *ok).count()
    }

    async fn deliver_to_peer(&self, peer_id: String, delay: Duration, message: &Message) -> bool {
        tokio::time::sleep(delay).await;

        let Some(endpoint) = self.endpoint(&peer_id) else {
            debug!("Peer {} vanished before delivery of {}", peer_id, message.id);
            return false;
        };
        let listeners = endpoint.deliver(message);
        debug!(
            "Delivered {} to {} after {:?} ({} listener(s))",
            message.id, peer_id, delay, listeners
        );
        true
    }

    /// Listen for messages arriving at `node_id` in `room_id`
    pub fn subscribe(&self, node_id: &str, room_id: &str) -> Result<Subscription, MeshError> {
        self.endpoint(node_id)
            .map(|e| e.subscribe(room_id))
            .ok_or_else(|| MeshError::NodeNotFound(node_id.to_string()))
    }

    /// The node's local history for a room, oldest first
    pub fn room_messages(&self, node_id: &str, room_id: &str) -> Vec<Message> {
        self.endpoint(node_id)
            .map(|e| e.store().load_room_messages(room_id))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStorage, DEFAULT_NAMESPACE};
    use std::sync::Arc;

    fn endpoint() -> Endpoint {
        Endpoint::new(LocalStore::new(
            Arc::new(MemoryStorage::new()),
            DEFAULT_NAMESPACE,
        ))
    }

    #[test]
    fn test_deliver_persists_without_listeners() {
        let endpoint = endpoint();
        let msg = Message::text("room-1", "a", "Alex", "hi");

        assert_eq!(endpoint.deliver(&msg), 0);
        assert_eq!(endpoint.store().load_room_messages("room-1"), vec![msg]);
    }

    #[test]
    fn test_each_listener_receives_once() {
        let endpoint = endpoint();
        let mut first = endpoint.subscribe("room-1");
        let mut second = endpoint.subscribe("room-1");
        let msg = Message::text("room-1", "a", "Alex", "hi");

        assert_eq!(endpoint.deliver(&msg), 2);

        assert_eq!(first.try_recv(), Some(msg.clone()));
        assert_eq!(second.try_recv(), Some(msg));
        assert!(first.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let endpoint = endpoint();
        let first = endpoint.subscribe("room-1");
        let mut second = endpoint.subscribe("room-1");
        assert_eq!(endpoint.listener_count("room-1"), 2);

        first.unsubscribe();
        assert_eq!(endpoint.listener_count("room-1"), 1);

        endpoint.deliver(&Message::text("room-1", "a", "Alex", "still here"));
        assert_eq!(second.try_recv().unwrap().content, "still here");
    }

    #[test]
    fn test_listeners_are_room_scoped() {
        let endpoint = endpoint();
        let mut other_room = endpoint.subscribe("room-2");

        endpoint.deliver(&Message::text("room-1", "a", "Alex", "hi"));

        assert!(other_room.try_recv().is_none());
    }
}
