// Core data types: users, mesh nodes, rooms, messages and proximity reports
//
// Timestamps are unix milliseconds throughout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default room capacity shown to users
pub const DEFAULT_MAX_MEMBERS: usize = 25;

/// Current unix time in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// The person operating a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: u64,
    pub last_seen: u64,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_room_id: Option<String>,
}

impl User {
    /// Create a fresh online user with a random id
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_id(format!("user-{}", uuid::Uuid::new_v4()), username)
    }

    pub fn with_id(id: impl Into<String>, username: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            username: username.into(),
            created_at: now,
            last_seen: now,
            is_online: true,
            current_room_id: None,
        }
    }
}

/// A participant in the simulated mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub username: String,
    pub is_host: bool,
    /// Star topology: the host lists every joined peer, peers list the host
    pub connected_peers: BTreeSet<String>,
    pub room_id: Option<String>,
    pub is_online: bool,
    pub last_seen: u64,
}

impl Node {
    /// An online node that belongs to no room
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            is_host: false,
            connected_peers: BTreeSet::new(),
            room_id: None,
            is_online: true,
            last_seen: now_millis(),
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self::new(user.id.clone(), user.username.clone())
    }

    pub fn is_affiliated(&self) -> bool {
        self.room_id.is_some()
    }

    pub fn is_in_room(&self, room_id: &str) -> bool {
        self.room_id.as_deref() == Some(room_id)
    }

    pub fn hosts(&self, room_id: &str) -> bool {
        self.is_host && self.is_in_room(room_id)
    }

    /// Return to the unaffiliated state
    pub(crate) fn detach(&mut self) {
        self.is_host = false;
        self.room_id = None;
        self.connected_peers.clear();
        self.last_seen = now_millis();
    }
}

/// A bounded chat session materialized from host node state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created_at: u64,
    /// Node id of the host
    pub created_by: String,
    pub member_count: usize,
    pub max_members: usize,
    pub is_active: bool,
    pub last_activity: u64,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.member_count >= self.max_members
    }

    /// Name shown for rooms whose announcement never reached us
    pub fn placeholder_name(room_id: &str) -> String {
        format!("Room {room_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    System,
}

/// A unit of chat content. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl Message {
    pub fn text(
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            room_id: room_id.into(),
            user_id: user_id.into(),
            username: username.into(),
            content: content.into(),
            timestamp: now_millis(),
            kind: MessageKind::Text,
        }
    }
}

/// Human readable bucket for a report's signal strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl std::fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "Excellent"),
            Self::Good => write!(f, "Good"),
            Self::Fair => write!(f, "Fair"),
            Self::Poor => write!(f, "Poor"),
        }
    }
}

/// An ephemeral "nearby device" observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityReport {
    pub id: String,
    pub user_id: String,
    pub username: String,
    /// Simulated distance in meters
    pub distance: f64,
    /// Simulated signal strength (0-100)
    pub signal_strength: f64,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

impl ProximityReport {
    pub fn signal_quality(&self) -> SignalQuality {
        match self.signal_strength {
            s if s >= 80.0 => SignalQuality::Excellent,
            s if s >= 60.0 => SignalQuality::Good,
            s if s >= 40.0 => SignalQuality::Fair,
            _ => SignalQuality::Poor,
        }
    }
}
