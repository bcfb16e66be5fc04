//! # Scene Graph System
//!
//! The scene graph is the spatial backbone of the simulator. It stores named
//! rigid-transform nodes in a hierarchy and composes their 4x4 matrices on
//! demand, so that moving one joint node carries every node mounted below it.
//!
//! ## Key Concepts
//!
//! - **Transform Nodes**: each node carries a local 4x4 matrix relative to its
//!   parent, plus a visibility flag for anything rendered at that node
//! - **World Matrices**: computed on request as `parent world x local`, walking
//!   the ancestor chain; nothing is cached, so readers always see the matrices
//!   implied by the current hierarchy
//! - **Name Index**: nodes may carry a stable string name so hosts can address
//!   them without holding ids across sessions
//!
//! The graph is purely structural: it knows nothing about joints, cameras, or
//! render targets. Those layers sit on top and drive node matrices through the
//! ids handed out here.

use glam::{DMat4, DVec3};
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::{
    collections::HashMap,
    fmt::{self, Display},
};

slotmap::new_key_type! {
/// Defines a unique identifier for nodes within the scene graph.
    pub struct TransformNodeId;
}

impl TransformNodeId {
    /// Converts this node id to a [u64], mainly for diagnostics
    pub fn as_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

impl Display for TransformNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u64())
    }
}

/// Error returned when a hierarchy edit cannot be applied.
///
/// Attachment is the only fallible edit: it refuses to orphan the graph by
/// looping a node under its own descendant, and it refuses ids that are no
/// longer alive in the backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    /// One of the ids passed to the edit does not refer to a live node
    UnknownNode(TransformNodeId),
    /// The requested parent is a descendant of the child, so the edit would
    /// create a cycle in the hierarchy
    WouldCycle {
        parent: TransformNodeId,
        child: TransformNodeId,
    },
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::UnknownNode(id) => write!(f, "Unknown transform node: {}", id),
            AttachError::WouldCycle { parent, child } => write!(
                f,
                "Attaching node {} under node {} would create a cycle",
                child, parent
            ),
        }
    }
}

impl std::error::Error for AttachError {}

/// SceneGraph manages the spatial relationships between transform nodes.
///
/// While the machine model maintains joint values and camera state, the scene
/// graph adds hierarchical structure for efficient:
/// - Transformation propagation (a gantry node carries its mounted children)
/// - Visibility control (hiding a subtree without tearing it down)
/// - Stable addressing (looking nodes up by name after assembly)
///
/// The graph serves as the spatial organization layer underneath the machine
/// model, without knowing what any particular node means to the simulator.
pub struct SceneGraph {
    /// The root node of the scene graph; everything else hangs below it
    root: TransformNodeId,

    /// Storage for all transform nodes, indexed by their ids
    nodes: SlotMap<TransformNodeId, TransformNode>,

    /// Maps from node names to node ids for host-facing lookups
    names: HashMap<String, TransformNodeId>,
}

impl SceneGraph {
    /// Creates a new, empty scene graph with an identity root node
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root_node = TransformNode {
            parent: None,
            children: SmallVec::new(),
            name: None,
            local: DMat4::IDENTITY,
            visible: true,
        };

        let root = nodes.insert(root_node);

        Self {
            root,
            nodes,
            names: HashMap::new(),
        }
    }

    /// Returns the id of the root node
    pub fn root(&self) -> TransformNodeId {
        self.root
    }

    /// Creates a new node as a child of the specified parent
    ///
    /// The node starts with an identity local matrix. A `None` parent attaches
    /// it directly under the root. Naming a node registers it in the name
    /// index; a repeated name simply rebinds the index entry.
    pub fn create_node(
        &mut self,
        parent_id: Option<TransformNodeId>,
        name: Option<&str>,
    ) -> TransformNodeId {
        let parent_id = parent_id.unwrap_or(self.root);

        let node = TransformNode {
            parent: Some(parent_id),
            children: SmallVec::new(),
            name: name.map(str::to_owned),
            local: DMat4::IDENTITY,
            visible: true,
        };

        let node_id = self.nodes.insert(node);

        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(node_id);
        }

        if let Some(name) = name {
            self.names.insert(name.to_owned(), node_id);
        }

        node_id
    }

    /// Re-parents an existing node under another node
    ///
    /// The child keeps its local matrix, so its world matrix changes with the
    /// new parent chain. Fails without modifying the graph if either id is
    /// dead or if the edit would create a cycle.
    pub fn attach(
        &mut self,
        parent_id: TransformNodeId,
        child_id: TransformNodeId,
    ) -> Result<(), AttachError> {
        if !self.nodes.contains_key(parent_id) {
            return Err(AttachError::UnknownNode(parent_id));
        }
        if !self.nodes.contains_key(child_id) {
            return Err(AttachError::UnknownNode(child_id));
        }

        // Check if this would create a cycle
        if self.is_ancestor(child_id, parent_id) {
            return Err(AttachError::WouldCycle {
                parent: parent_id,
                child: child_id,
            });
        }

        // Remove from current parent's children list
        if let Some(old_parent_id) = self.nodes.get(child_id).and_then(|node| node.parent) {
            if let Some(old_parent) = self.nodes.get_mut(old_parent_id) {
                old_parent.children.retain(|id| *id != child_id);
            }
        }

        // Update parent reference
        if let Some(child) = self.nodes.get_mut(child_id) {
            child.parent = Some(parent_id);
        }

        // Add to new parent's children list
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(child_id);
        }

        Ok(())
    }

    /// Removes a node and all its children from the scene graph
    ///
    /// Returns the removed node's name, if it had one. The root node cannot
    /// be removed.
    pub fn remove_node(&mut self, node_id: TransformNodeId) -> Option<String> {
        if node_id == self.root {
            return None;
        }

        // Remove from parent's children list
        if let Some(parent_id) = self.nodes.get(node_id).and_then(|node| node.parent) {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                parent.children.retain(|id| *id != node_id);
            }
        }

        let name = self.nodes.get(node_id).and_then(|node| node.name.clone());

        if let Some(name) = &name {
            self.names.remove(name);
        }

        // Remove all children recursively
        if let Some(node) = self.nodes.get(node_id) {
            let children: Vec<_> = node.children.to_vec();
            for child_id in children {
                self.remove_node(child_id);
            }
        }

        self.nodes.remove(node_id);

        name
    }

    /// Looks a node up by the name it was created with
    pub fn node_by_name(&self, name: &str) -> Option<TransformNodeId> {
        self.names.get(name).copied()
    }

    /// Gets the children of a node
    pub fn children(&self, node_id: TransformNodeId) -> Vec<TransformNodeId> {
        self.nodes
            .get(node_id)
            .map(|node| node.children.to_vec())
            .unwrap_or_default()
    }

    /// Clears all nodes from the scene graph except the root
    pub fn clear(&mut self) {
        let root_node = TransformNode {
            parent: None,
            children: SmallVec::new(),
            name: None,
            local: DMat4::IDENTITY,
            visible: true,
        };

        self.nodes.clear();
        self.names.clear();

        self.root = self.nodes.insert(root_node);
    }

    /// Replaces a node's local matrix
    pub fn set_local_matrix(&mut self, node_id: TransformNodeId, local: DMat4) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.local = local;
        }
    }

    /// Returns a node's local matrix, or `None` for a dead id
    pub fn local_matrix(&self, node_id: TransformNodeId) -> Option<DMat4> {
        self.nodes.get(node_id).map(|node| node.local)
    }

    /// Calculates the world matrix of a node by traversing up the parent
    /// hierarchy and composing local matrices along the way
    ///
    /// A dead id yields the identity, which keeps callers that race a removal
    /// well-defined.
    pub fn world_matrix(&self, node_id: TransformNodeId) -> DMat4 {
        let node = match self.nodes.get(node_id) {
            Some(n) => n,
            None => return DMat4::IDENTITY,
        };

        // If there's a parent, compose below its world matrix
        if let Some(parent_id) = node.parent {
            self.world_matrix(parent_id) * node.local
        } else {
            node.local
        }
    }

    /// Calculates the world-space position of a node's origin
    pub fn world_position(&self, node_id: TransformNodeId) -> DVec3 {
        self.world_matrix(node_id).transform_point3(DVec3::ZERO)
    }

    /// Get a reference to a node by its id
    pub fn get_node(&self, node_id: TransformNodeId) -> Option<&TransformNode> {
        self.nodes.get(node_id)
    }

    /// Sets the visibility of a node
    pub fn set_visible(&mut self, node_id: TransformNodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.visible = visible;
        }
    }

    /// Determines if a node is an ancestor of another node in the hierarchy
    ///
    /// This method traverses the parent chain of the descendant node upward
    /// to determine if the specified node exists in its ancestry. This check
    /// is critical for preventing cycles during hierarchy modifications, which
    /// would create infinite loops during transformation propagation.
    ///
    /// The algorithm uses iterative parent traversal rather than recursion
    /// to handle arbitrary depth hierarchies efficiently.
    fn is_ancestor(&self, node_id: TransformNodeId, descendant_id: TransformNodeId) -> bool {
        let mut current = Some(descendant_id);
        while let Some(id) = current {
            if id == node_id {
                return true;
            }
            current = self.nodes.get(id).and_then(|node| node.parent);
        }
        false
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// TransformNode represents a single node in the scene graph hierarchy.
///
/// Each node maintains its position in the hierarchy (parent/children), a
/// local 4x4 matrix relative to its parent, and a visibility flag for
/// whatever the host renders at this node. A node may carry a stable name,
/// or it may be a pure structural node (like the root).
#[derive(Debug)]
pub struct TransformNode {
    /// Reference to the parent node, if any
    /// The root node has no parent (None)
    parent: Option<TransformNodeId>,

    /// References to all child nodes of this node
    children: SmallVec<[TransformNodeId; 4]>,

    /// Stable name for host-facing lookups, if any
    /// Structural nodes like the root may not have a name
    name: Option<String>,

    /// Rigid transform relative to the parent node
    local: DMat4,

    /// Whether anything mounted at this node should be rendered
    /// Useful for temporarily hiding nodes without removing them
    visible: bool,
}

impl TransformNode {
    /// Returns this node's parent, if any
    pub fn parent(&self) -> Option<TransformNodeId> {
        self.parent
    }

    /// Returns a reference to the node's children
    pub fn children(&self) -> &[TransformNodeId] {
        &self.children
    }

    /// Returns the name this node was created with, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the node's local matrix
    pub fn local_matrix(&self) -> DMat4 {
        self.local
    }

    /// Returns whether the node is visible
    pub fn is_visible(&self) -> bool {
        self.visible
    }
}
