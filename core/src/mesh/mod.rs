//! Peer mesh: the owned simulation context and the per-device client
//!
//! A [`Mesh`] holds everything the simulated radio layer shares: the node
//! registry, one endpoint per node (local store plus room listeners), the
//! table of room announcements and the scheduler that owns every timer.
//! Separate `Mesh` values never observe each other.

pub mod broadcast;
pub mod discovery;
pub mod membership;
pub mod registry;
pub mod scheduler;
pub mod simulator;

pub use broadcast::{Endpoint, Subscription};
pub use discovery::{DiscoveryEngine, ProximityScanner};
pub use membership::RoomAnnouncement;
pub use registry::NodeRegistry;
pub use scheduler::Scheduler;
pub use simulator::{Activity, ActivitySimulator};

use crate::config::MeshConfig;
use crate::store::{node_namespace, LocalStore, MemoryStorage, StorageBackend};
use crate::types::{Message, Node, ProximityReport, Room, User};
use crate::MeshError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

struct MeshInner {
    config: MeshConfig,
    backend: Arc<dyn StorageBackend>,
    registry: NodeRegistry,
    endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
    announcements: RwLock<HashMap<String, RoomAnnouncement>>,
    scheduler: Scheduler,
}

impl Drop for MeshInner {
    fn drop(&mut self) {
        self.scheduler.cancel_all();
    }
}

#[derive(Clone)]
pub struct Mesh {
    inner: Arc<MeshInner>,
}

/// Non-owning handle held by scheduled work so timers never keep a mesh alive
#[derive(Clone)]
pub(crate) struct WeakMesh(Weak<MeshInner>);

impl WeakMesh {
    pub(crate) fn upgrade(&self) -> Option<Mesh> {
        self.0.upgrade().map(|inner| Mesh { inner })
    }
}

impl Mesh {
    pub fn new(config: MeshConfig, backend: Arc<dyn StorageBackend>) -> Result<Self, MeshError> {
        config.validate()?;
        Ok(Self::from_parts(config, backend))
    }

    /// Default configuration over a throwaway in-memory backend
    pub fn in_memory() -> Self {
        Self::from_parts(MeshConfig::default(), Arc::new(MemoryStorage::new()))
    }

    fn from_parts(config: MeshConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner: Arc::new(MeshInner {
                config,
                backend,
                registry: NodeRegistry::new(),
                endpoints: RwLock::new(HashMap::new()),
                announcements: RwLock::new(HashMap::new()),
                scheduler: Scheduler::new(),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakMesh {
        WeakMesh(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &MeshConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.inner.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn endpoint(&self, node_id: &str) -> Option<Arc<Endpoint>> {
        self.inner.endpoints.read().get(node_id).cloned()
    }

    pub(crate) fn announce(&self, room_id: &str, announcement: RoomAnnouncement) {
        self.inner
            .announcements
            .write()
            .insert(room_id.to_string(), announcement);
    }

    pub(crate) fn announcement(&self, room_id: &str) -> Option<RoomAnnouncement> {
        self.inner.announcements.read().get(room_id).cloned()
    }

    /// Local store of one node, scoped so nodes sharing a backend stay isolated.
    ///
    /// For a node on the mesh this is its endpoint's store, sharing its write lock.
    pub fn node_store(&self, node_id: &str) -> LocalStore {
        match self.endpoint(node_id) {
            Some(endpoint) => endpoint.store().clone(),
            None => LocalStore::new(self.inner.backend.clone(), node_namespace(node_id)),
        }
    }

    /// Put `user` on the mesh as an online, unaffiliated node
    pub fn initialize_node(&self, user: User) -> MeshClient {
        // Re-initializing a node that sits in a room first takes it out cleanly
        if let Some(room_id) = self.registry().get(&user.id).and_then(|n| n.room_id) {
            if let Err(e) = self.leave_room(&room_id, &user.id) {
                warn!("Could not take {} out of {}: {}", user.id, room_id, e);
            }
        }

        self.registry().register(Node::from_user(&user));
        let fresh = LocalStore::new(self.inner.backend.clone(), node_namespace(&user.id));
        let store = self
            .inner
            .endpoints
            .write()
            .entry(user.id.clone())
            .or_insert_with(|| Arc::new(Endpoint::new(fresh)))
            .store()
            .clone();
        store.save_identity(Some(&user));

        info!("Mesh node initialized for {} ({})", user.username, user.id);

        let discovery = DiscoveryEngine::new(
            user.id.clone(),
            self.registry().clone(),
            self.scheduler().clone(),
            self.config().clone(),
        );
        MeshClient {
            mesh: self.clone(),
            user,
            store,
            discovery,
        }
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.registry().all()
    }

    pub fn node(&self, node_id: &str) -> Option<Node> {
        self.registry().get(node_id)
    }

    /// Cancel every timer and forget every node, endpoint and announcement.
    ///
    /// Deliveries already past their latency sleep still run; they find no
    /// endpoint and are skipped.
    pub fn cleanup(&self) {
        self.scheduler().cancel_all();
        self.registry().clear();
        self.inner.endpoints.write().clear();
        self.inner.announcements.write().clear();
        info!("Mesh cleaned up");
    }
}

/// One device's view of the mesh. Every operation acts as the client's user.
#[derive(Clone)]
pub struct MeshClient {
    mesh: Mesh,
    user: User,
    store: LocalStore,
    discovery: DiscoveryEngine,
}

impl MeshClient {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn node(&self) -> Option<Node> {
        self.mesh.node(&self.user.id)
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Returns false if discovery was already running
    pub fn start_discovery<F>(&self, on_found: F) -> bool
    where
        F: FnMut(ProximityReport) + Send + 'static,
    {
        self.discovery.start(on_found)
    }

    pub fn stop_discovery(&self) {
        self.discovery.stop();
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_running()
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    pub fn create_room(&self, name: &str) -> Result<Room, MeshError> {
        let room = self.mesh.create_room(name, &self.user.id)?;
        self.remember_room(Some(&room.id));
        Ok(room)
    }

    pub fn join_room(&self, room_id: &str) -> Result<Room, MeshError> {
        let room = self.mesh.join_room(room_id, &self.user.id)?;
        self.remember_room(Some(&room.id));
        Ok(room)
    }

    pub fn leave_room(&self, room_id: &str) -> Result<(), MeshError> {
        self.mesh.leave_room(room_id, &self.user.id)?;
        self.remember_room(None);
        Ok(())
    }

    pub fn list_available_rooms(&self) -> Vec<Room> {
        self.mesh.list_available_rooms()
    }

    fn remember_room(&self, room_id: Option<&str>) {
        let mut user = self
            .store
            .load_identity()
            .unwrap_or_else(|| self.user.clone());
        user.current_room_id = room_id.map(str::to_string);
        user.last_seen = crate::types::now_millis();
        self.store.save_identity(Some(&user));
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn send_message(&self, room_id: &str, content: &str) -> Result<Message, MeshError> {
        self.mesh.send_message(room_id, &self.user.id, content).await
    }

    pub fn room_messages(&self, room_id: &str) -> Vec<Message> {
        self.store.load_room_messages(room_id)
    }

    pub fn subscribe(&self, room_id: &str) -> Result<Subscription, MeshError> {
        self.mesh.subscribe(&self.user.id, room_id)
    }
}
