//! Room membership: the per-node room state machine
//!
//! ```text
//! Unaffiliated --create--> Hosting
//! Unaffiliated --join----> Joined
//! Hosting | Joined --leave--> Unaffiliated
//! ```
//!
//! Rooms form a star: the host links to every joined peer and each peer
//! links only to the host. A room's member count is never stored; it is
//! recomputed from the registry every time a `Room` is materialized.

use crate::mesh::registry::member_count;
use crate::mesh::Mesh;
use crate::types::{now_millis, Room};
use crate::validation::validate_room_name;
use crate::MeshError;
use tracing::info;

/// Room metadata announced by the host when the room is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAnnouncement {
    pub name: String,
    pub created_at: u64,
    pub created_by: String,
}

fn new_room_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("room-{}-{}", now_millis(), &suffix[..5])
}

impl Mesh {
    /// Make `node_id` the host of a brand new room
    pub fn create_room(&self, name: &str, node_id: &str) -> Result<Room, MeshError> {
        validate_room_name(name).map_err(MeshError::InvalidInput)?;
        let room_id = new_room_id();

        let host = self.registry().transact(|nodes| {
            let node = nodes
                .get_mut(node_id)
                .ok_or_else(|| MeshError::NodeNotFound(node_id.to_string()))?;
            if let Some(current) = &node.room_id {
                return Err(MeshError::AlreadyInRoom(current.clone()));
            }
            node.is_host = true;
            node.room_id = Some(room_id.clone());
            node.last_seen = now_millis();
            Ok(node.clone())
        })?;

        let announcement = RoomAnnouncement {
            name: name.to_string(),
            created_at: now_millis(),
            created_by: host.id.clone(),
        };
        self.announce(&room_id, announcement.clone());

        info!("Room created: {} ({}) host {}", name, room_id, host.username);
        Ok(self.materialize(&room_id, &announcement, 1))
    }

    /// Join the room hosted under `room_id`, linking to its host
    pub fn join_room(&self, room_id: &str, node_id: &str) -> Result<Room, MeshError> {
        let max_members = self.config().max_members;

        let (host_id, members) = self.registry().transact(|nodes| {
            let node = nodes
                .get(node_id)
                .ok_or_else(|| MeshError::NodeNotFound(node_id.to_string()))?;
            if let Some(current) = &node.room_id {
                return Err(MeshError::AlreadyInRoom(current.clone()));
            }
            let host_id = nodes
                .values()
                .find(|n| n.hosts(room_id))
                .map(|n| n.id.clone())
                .ok_or_else(|| MeshError::RoomNotFound(room_id.to_string()))?;
            if member_count(nodes, room_id) >= max_members {
                return Err(MeshError::RoomFull {
                    room_id: room_id.to_string(),
                    max_members,
                });
            }

            let now = now_millis();
            if let Some(node) = nodes.get_mut(node_id) {
                node.room_id = Some(room_id.to_string());
                node.connected_peers.insert(host_id.clone());
                node.last_seen = now;
            }
            if let Some(host) = nodes.get_mut(&host_id) {
                host.connected_peers.insert(node_id.to_string());
            }
            Ok((host_id, member_count(nodes, room_id)))
        })?;

        let announcement = self.announcement(room_id).unwrap_or_else(|| RoomAnnouncement {
            name: Room::placeholder_name(room_id),
            created_at: now_millis(),
            created_by: host_id,
        });

        info!("{} joined room {} ({} member(s))", node_id, room_id, members);
        Ok(self.materialize(room_id, &announcement, members))
    }

    /// Detach `node_id` from the room and wipe its local history of it
    pub fn leave_room(&self, room_id: &str, node_id: &str) -> Result<(), MeshError> {
        self.registry().transact(|nodes| {
            let node = nodes
                .get_mut(node_id)
                .ok_or_else(|| MeshError::NodeNotFound(node_id.to_string()))?;
            if node.room_id.as_deref().is_some_and(|current| current != room_id) {
                return Err(MeshError::NotInRoom(room_id.to_string()));
            }
            node.detach();
            for other in nodes.values_mut() {
                other.connected_peers.remove(node_id);
            }
            Ok(())
        })?;

        if let Some(endpoint) = self.endpoint(node_id) {
            endpoint.store().clear_room_messages(room_id);
        }

        info!("{} left room {}", node_id, room_id);
        Ok(())
    }

    /// Every hosted room, recomputed from the registry
    pub fn list_available_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .registry()
            .hosts()
            .into_iter()
            .filter_map(|host| {
                let room_id = host.room_id?;
                let announcement =
                    self.announcement(&room_id).unwrap_or_else(|| RoomAnnouncement {
                        name: Room::placeholder_name(&room_id),
                        created_at: host.last_seen,
                        created_by: host.id.clone(),
                    });
                let members = self.registry().member_count(&room_id);
                Some(self.materialize(&room_id, &announcement, members))
            })
            .filter(|room| room.is_active)
            .collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rooms
    }

    /// Current view of a room that was announced on this mesh, hosted or not
    pub fn room(&self, room_id: &str) -> Option<Room> {
        let announcement = self.announcement(room_id)?;
        let members = self.registry().member_count(room_id);
        Some(self.materialize(room_id, &announcement, members))
    }

    fn materialize(&self, room_id: &str, announcement: &RoomAnnouncement, members: usize) -> Room {
        Room {
            id: room_id.to_string(),
            name: announcement.name.clone(),
            created_at: announcement.created_at,
            created_by: announcement.created_by.clone(),
            member_count: members,
            max_members: self.config().max_members,
            is_active: members > 0,
            last_activity: now_millis(),
        }
    }
}
