//! Node registry: the single source of truth for every mesh participant
//!
//! Reads hand out snapshots. Multi-node transitions (join, leave) run inside
//! [`NodeRegistry::transact`] so they are applied under one write lock and no
//! other task ever observes a half-linked room.

use crate::types::Node;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: Arc<RwLock<HashMap<String, Node>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a node by id
    pub fn register(&self, node: Node) {
        self.nodes.write().insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<Node> {
        self.nodes.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.read().contains_key(id)
    }

    /// Snapshot of every node, in no particular order
    pub fn all(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn remove(&self, id: &str) -> Option<Node> {
        self.nodes.write().remove(id)
    }

    pub fn clear(&self) {
        self.nodes.write().clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Mutate one node in place; `None` if it is not registered
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
        self.nodes.write().get_mut(id).map(f)
    }

    /// Run a multi-node transition under a single write lock
    pub(crate) fn transact<R>(&self, f: impl FnOnce(&mut HashMap<String, Node>) -> R) -> R {
        f(&mut self.nodes.write())
    }

    /// Nodes whose `room_id` is `room_id`
    pub fn room_members(&self, room_id: &str) -> Vec<Node> {
        self.nodes
            .read()
            .values()
            .filter(|n| n.is_in_room(room_id))
            .cloned()
            .collect()
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        member_count(&self.nodes.read(), room_id)
    }

    pub fn find_host(&self, room_id: &str) -> Option<Node> {
        self.nodes
            .read()
            .values()
            .find(|n| n.hosts(room_id))
            .cloned()
    }

    /// Every hosting node, one per live room
    pub fn hosts(&self) -> Vec<Node> {
        self.nodes
            .read()
            .values()
            .filter(|n| n.is_host && n.room_id.is_some())
            .cloned()
            .collect()
    }
}

pub(crate) fn member_count(nodes: &HashMap<String, Node>, room_id: &str) -> usize {
    nodes.values().filter(|n| n.is_in_room(room_id)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosted(id: &str, room_id: &str) -> Node {
        let mut node = Node::new(id, id);
        node.is_host = true;
        node.room_id = Some(room_id.to_string());
        node
    }

    #[test]
    fn test_register_is_idempotent_overwrite() {
        let registry = NodeRegistry::new();
        registry.register(Node::new("a", "Alex"));
        registry.register(Node::new("a", "Alexandra"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().username, "Alexandra");
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = NodeRegistry::new();
        registry.register(Node::new("a", "Alex"));
        registry.register(Node::new("b", "Sarah"));

        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(registry.remove("a").is_none());

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_room_queries() {
        let registry = NodeRegistry::new();
        registry.register(hosted("h", "room-1"));
        let mut member = Node::new("m", "Mike");
        member.room_id = Some("room-1".to_string());
        registry.register(member);
        registry.register(Node::new("idle", "Emma"));

        assert_eq!(registry.member_count("room-1"), 2);
        assert_eq!(registry.member_count("room-2"), 0);
        assert_eq!(registry.find_host("room-1").unwrap().id, "h");
        assert!(registry.find_host("room-2").is_none());
        assert_eq!(registry.hosts().len(), 1);
        assert_eq!(registry.room_members("room-1").len(), 2);
    }

    #[test]
    fn test_update_missing_node() {
        let registry = NodeRegistry::new();
        assert!(registry.update("ghost", |n| n.is_online = false).is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let registry = NodeRegistry::new();
        let clone = registry.clone();
        clone.register(Node::new("a", "Alex"));
        assert!(registry.contains("a"));
    }
}
