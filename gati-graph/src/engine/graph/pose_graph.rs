//! Persistent pose graph store.
//!
//! Holds every solved pose node and every relation that has been consumed
//! by a solve. Both collections are append-only, which is what lets a
//! failed solve be undone by truncating back to a [`Checkpoint`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::relation::{Relation, RelationKind};
use crate::core::types::Pose2D;

/// A node in the pose graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseNode {
    /// Node index (monotonically increasing, 0 is the origin).
    pub id: u64,

    /// Current pose estimate.
    pub pose: Pose2D,
}

impl PoseNode {
    /// Create a new pose node.
    pub fn new(id: u64, pose: Pose2D) -> Self {
        Self { id, pose }
    }
}

/// Collection sizes recorded before a staged insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    nodes: usize,
    relations: usize,
}

/// Pose graph: nodes plus the relations between them.
#[derive(Debug, Default)]
pub struct PoseGraph {
    /// All nodes in insertion order.
    nodes: Vec<PoseNode>,

    /// All relations in insertion order.
    relations: Vec<Relation>,

    /// Node ID to position in `nodes`.
    node_index: HashMap<u64, usize>,

    /// Node ID to positions in `relations` that touch it.
    adjacency: HashMap<u64, Vec<usize>>,
}

impl PoseGraph {
    /// Create a new empty pose graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Returns false if the ID already exists.
    pub fn add_node(&mut self, node: PoseNode) -> bool {
        if self.node_index.contains_key(&node.id) {
            return false;
        }
        self.node_index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Append a relation.
    pub fn add_relation(&mut self, relation: Relation) {
        let idx = self.relations.len();
        let (a, b) = relation.nodes();
        self.adjacency.entry(a).or_default().push(idx);
        if let Some(b) = b
            && b != a
        {
            self.adjacency.entry(b).or_default().push(idx);
        }
        self.relations.push(relation);
    }

    /// Whether a node exists.
    pub fn contains(&self, id: u64) -> bool {
        self.node_index.contains_key(&id)
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: u64) -> Option<&PoseNode> {
        self.node_index.get(&id).map(|&idx| &self.nodes[idx])
    }

    /// Get a pose by node ID.
    pub fn pose(&self, id: u64) -> Option<Pose2D> {
        self.get_node(id).map(|n| n.pose)
    }

    /// Overwrite the pose of an existing node.
    pub fn set_pose(&mut self, id: u64, pose: Pose2D) -> bool {
        match self.node_index.get(&id) {
            Some(&idx) => {
                self.nodes[idx].pose = pose;
                true
            }
            None => false,
        }
    }

    /// All nodes.
    pub fn nodes(&self) -> &[PoseNode] {
        &self.nodes
    }

    /// All relations.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Relation positions touching a node.
    pub fn relations_of(&self, id: u64) -> &[usize] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of relations.
    pub fn num_relations(&self) -> usize {
        self.relations.len()
    }

    /// Number of relations of a given kind.
    pub fn count_kind(&self, kind: RelationKind) -> usize {
        self.relations.iter().filter(|r| r.kind() == kind).count()
    }

    /// Record current sizes.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.nodes.len(),
            relations: self.relations.len(),
        }
    }

    /// Drop everything added since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        for node in self.nodes.drain(checkpoint.nodes..) {
            self.node_index.remove(&node.id);
        }
        let removed: Vec<Relation> = self.relations.drain(checkpoint.relations..).collect();
        for relation in &removed {
            let (a, b) = relation.nodes();
            for id in std::iter::once(a).chain(b) {
                if let Some(list) = self.adjacency.get_mut(&id) {
                    list.retain(|&idx| idx < checkpoint.relations);
                    if list.is_empty() {
                        self.adjacency.remove(&id);
                    }
                }
            }
        }
    }
}
