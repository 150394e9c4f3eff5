// Local store: identity, nearby sightings and per-room message history
//
// Every failure is logged and degrades to "as if nothing was stored"; nothing
// in here ever returns an error to its caller.

use crate::config::RetentionPolicy;
use crate::store::backend::{StorageBackend, StorageError};
use crate::types::{now_millis, Message, ProximityReport, Room, User};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Namespace used by a device that has no node-specific scope
pub const DEFAULT_NAMESPACE: &str = "bluechat";

/// Namespace of one mesh node's store, e.g. `bluechat.user-42`
pub fn node_namespace(node_id: &str) -> String {
    format!("{DEFAULT_NAMESPACE}.{node_id}")
}

const CURRENT_USER: &str = "current_user";
const NEARBY_USERS: &str = "nearby_users";
const ROOM_MESSAGES: &str = "room_messages:";
const AVAILABLE_ROOMS: &str = "available_rooms";
const APP_SETTINGS: &str = "app_settings";

const HOUR_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub username: Option<String>,
    pub last_active: Option<u64>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageInfo {
    /// Bytes held by every value in the namespace
    pub total_size: usize,
    pub message_count: usize,
    pub room_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub nearby_removed: usize,
    pub messages_removed: usize,
}

/// Handle on one namespace of a backend.
///
/// Clones share a write lock, so read-modify-write updates made through any
/// clone are applied one at a time. Separately constructed stores over the
/// same namespace do not share it.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn StorageBackend>,
    namespace: String,
    writes: Arc<Mutex<()>>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn StorageBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.namespace, suffix)
    }

    fn room_key(&self, room_id: &str) -> String {
        self.key(&format!("{ROOM_MESSAGES}{room_id}"))
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set(key, &bytes)
    }

    // ------------------------------------------------------------------------
    // IDENTITY
    // ------------------------------------------------------------------------

    /// Persist the current user, or forget it on `None`
    pub fn save_identity(&self, user: Option<&User>) {
        let key = self.key(CURRENT_USER);
        let result = match user {
            Some(user) => self.write_json(&key, user),
            None => self.backend.remove(&key),
        };
        if let Err(e) = result {
            error!("Failed to save current user: {}", e);
        }
    }

    pub fn load_identity(&self) -> Option<User> {
        self.read_json(&self.key(CURRENT_USER)).unwrap_or_else(|e| {
            error!("Failed to load current user: {}", e);
            None
        })
    }

    // ------------------------------------------------------------------------
    // NEARBY USERS
    // ------------------------------------------------------------------------

    pub fn save_nearby(&self, reports: &[ProximityReport]) {
        if let Err(e) = self.write_json(&self.key(NEARBY_USERS), reports) {
            error!("Failed to save nearby users: {}", e);
        }
    }

    pub fn load_nearby(&self) -> Vec<ProximityReport> {
        self.read_json(&self.key(NEARBY_USERS))
            .unwrap_or_else(|e| {
                error!("Failed to load nearby users: {}", e);
                None
            })
            .unwrap_or_default()
    }

    /// Replace the sighting of the same user, or append a new one
    pub fn upsert_nearby(&self, report: ProximityReport) {
        let _writing = self.writes.lock();
        let mut reports = self.load_nearby();
        match reports.iter_mut().find(|r| r.user_id == report.user_id) {
            Some(existing) => *existing = report,
            None => reports.push(report),
        }
        self.save_nearby(&reports);
    }

    // ------------------------------------------------------------------------
    // ROOM HISTORY
    // ------------------------------------------------------------------------

    fn save_room_messages(&self, room_id: &str, messages: &[Message]) {
        if let Err(e) = self.write_json(&self.room_key(room_id), messages) {
            error!("Failed to save messages for {}: {}", room_id, e);
        }
    }

    /// Append to the room's history; concurrent appends are serialised
    pub fn append_room_message(&self, room_id: &str, message: &Message) {
        let _writing = self.writes.lock();
        let mut messages = self.load_room_messages(room_id);
        messages.push(message.clone());
        self.save_room_messages(room_id, &messages);
    }

    /// Oldest first, in append order
    pub fn load_room_messages(&self, room_id: &str) -> Vec<Message> {
        self.read_json(&self.room_key(room_id))
            .unwrap_or_else(|e| {
                error!("Failed to load messages for {}: {}", room_id, e);
                None
            })
            .unwrap_or_default()
    }

    pub fn clear_room_messages(&self, room_id: &str) {
        let _writing = self.writes.lock();
        if let Err(e) = self.backend.remove(&self.room_key(room_id)) {
            error!("Failed to clear messages for {}: {}", room_id, e);
        }
    }

    /// Ids of every room with stored history
    pub fn rooms_with_history(&self) -> Vec<String> {
        let prefix = self.room_key("");
        match self.backend.keys_with_prefix(&prefix) {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                .collect(),
            Err(e) => {
                error!("Failed to list room histories: {}", e);
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------------
    // ROOM CACHE & SETTINGS
    // ------------------------------------------------------------------------

    pub fn save_available_rooms(&self, rooms: &[Room]) {
        if let Err(e) = self.write_json(&self.key(AVAILABLE_ROOMS), rooms) {
            error!("Failed to save available rooms: {}", e);
        }
    }

    pub fn load_available_rooms(&self) -> Vec<Room> {
        self.read_json(&self.key(AVAILABLE_ROOMS))
            .unwrap_or_else(|e| {
                error!("Failed to load available rooms: {}", e);
                None
            })
            .unwrap_or_default()
    }

    pub fn save_app_settings(&self, settings: &AppSettings) {
        if let Err(e) = self.write_json(&self.key(APP_SETTINGS), settings) {
            error!("Failed to save app settings: {}", e);
        }
    }

    pub fn load_app_settings(&self) -> AppSettings {
        self.read_json(&self.key(APP_SETTINGS))
            .unwrap_or_else(|e| {
                error!("Failed to load app settings: {}", e);
                None
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // MAINTENANCE
    // ------------------------------------------------------------------------

    /// Remove every key in this namespace
    pub fn clear_all(&self) {
        let _writing = self.writes.lock();
        let keys = match self.backend.keys_with_prefix(&self.key("")) {
            Ok(keys) => keys,
            Err(e) => {
                error!("Failed to list keys for wipe: {}", e);
                return;
            }
        };
        for key in &keys {
            if let Err(e) = self.backend.remove(key) {
                error!("Failed to remove {}: {}", key, e);
            }
        }
        if let Err(e) = self.backend.flush() {
            error!("Failed to flush after wipe: {}", e);
        }
        debug!("Cleared {} key(s) from {}", keys.len(), self.namespace);
    }

    /// Drop stale sightings and cap each room's history, discarding the oldest
    pub fn prune_expired(&self, policy: RetentionPolicy) -> PruneReport {
        let _writing = self.writes.lock();
        let mut report = PruneReport::default();

        let max_age = policy.max_age_hours.saturating_mul(HOUR_MS);
        let cutoff = now_millis().saturating_sub(max_age);
        let nearby = self.load_nearby();
        let before = nearby.len();
        let recent: Vec<ProximityReport> =
            nearby.into_iter().filter(|r| r.timestamp > cutoff).collect();
        report.nearby_removed = before - recent.len();
        if report.nearby_removed > 0 {
            self.save_nearby(&recent);
        }

        for room_id in self.rooms_with_history() {
            let mut messages = self.load_room_messages(&room_id);
            if messages.len() > policy.max_messages_per_room {
                let excess = messages.len() - policy.max_messages_per_room;
                messages.drain(..excess);
                self.save_room_messages(&room_id, &messages);
                report.messages_removed += excess;
            }
        }

        debug!(
            "Pruned {} sighting(s) and {} message(s) from {}",
            report.nearby_removed, report.messages_removed, self.namespace
        );
        report
    }

    pub fn storage_info(&self) -> StorageInfo {
        let mut info = StorageInfo::default();
        let keys = match self.backend.keys_with_prefix(&self.key("")) {
            Ok(keys) => keys,
            Err(e) => {
                error!("Failed to read storage info: {}", e);
                return info;
            }
        };
        let room_prefix = self.room_key("");
        for key in keys {
            let Ok(Some(value)) = self.backend.get(&key) else {
                continue;
            };
            info.total_size += value.len();
            if key.starts_with(&room_prefix) {
                info.room_count += 1;
                info.message_count += serde_json::from_slice::<Vec<Message>>(&value)
                    .map(|m| m.len())
                    .unwrap_or(0);
            }
        }
        info
    }

    pub fn flush(&self) {
        if let Err(e) = self.backend.flush() {
            error!("Failed to flush local store: {}", e);
        }
    }
}
