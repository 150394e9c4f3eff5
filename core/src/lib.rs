// BlueChat Core: proximity mesh simulator and local persistence
//
// Devices find each other, host or join short-lived rooms and exchange
// messages directly. Nothing leaves the device except over the mesh.

pub mod config;
pub mod mesh;
pub mod store;
pub mod types;
pub mod validation;

use thiserror::Error;

pub use config::{ConfigError, MeshConfig, RetentionPolicy};
pub use mesh::{Activity, ActivitySimulator, Mesh, MeshClient, Subscription};
pub use store::{
    AppSettings, LocalStore, MemoryStorage, PruneReport, SledStorage, StorageBackend,
    StorageError, StorageInfo,
};
pub use types::{Message, MessageKind, Node, ProximityReport, Room, SignalQuality, User};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Failures surfaced by membership and send operations.
///
/// Storage failures never show up here; the local store swallows them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Room {room_id} is full ({max_members} members)")]
    RoomFull { room_id: String, max_members: usize },

    #[error("Sender not registered on the mesh: {0}")]
    SenderNotRegistered(String),

    #[error("Already in room {0}")]
    AlreadyInRoom(String),

    #[error("Not in room {0}")]
    NotInRoom(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

// ============================================================================
// LOGGING
// ============================================================================

/// `RUST_LOG` if set, otherwise `default_filter`
pub fn env_filter(default_filter: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
}

/// Install a stderr fmt subscriber using [`env_filter`]. Safe to call more
/// than once.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .try_init();
}
