//! Scan tree: the mutable record of discovered layers
//!
//! Nodes live in an arena indexed by `NodeId`; parent and child links are
//! ids, never owning references. Each node is keyed by its path spec's
//! canonical string, so re-adding a known layer hands back the existing
//! node instead of duplicating it.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{VfsError, VfsResult};
use crate::spec::PathSpec;

// =============================================================================
// Types
// =============================================================================

/// Index of a scan node within its owning context's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub usize);

/// What kind of source a completed scan classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    File,
    Directory,
    StorageMediaDevice,
    StorageMediaImage,
}

/// One discovered layer in the scan tree
#[derive(Debug)]
pub struct ScanNode {
    path_spec: Arc<PathSpec>,
    parent: Option<NodeId>,
    /// Discovery order; volume children keep on-disk/table order
    children: Vec<NodeId>,
    scanned: bool,
}

impl ScanNode {
    pub fn path_spec(&self) -> &Arc<PathSpec> {
        &self.path_spec
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the scanner has already processed this node
    pub fn is_scanned(&self) -> bool {
        self.scanned
    }
}

// =============================================================================
// Context
// =============================================================================

/// The scan tree plus per-scan bookkeeping.
///
/// `source_type` is write-once: the first classification during a scan
/// wins and later layers never override it.
#[derive(Default)]
pub struct ScanContext {
    nodes: Vec<Option<ScanNode>>,
    by_key: HashMap<String, NodeId>,
    last_scan_node: Option<NodeId>,
    source_type: Option<SourceType>,
}

impl ScanContext {
    pub fn new() -> Self {
        ScanContext::default()
    }

    /// Seed the tree with an OS-level root for the given source path
    pub fn open_source_path(&mut self, path: impl AsRef<Path>) -> NodeId {
        let location = path.as_ref().to_string_lossy().to_string();
        debug!(location, "Opening source path");
        self.add_scan_node(PathSpec::os(location), None)
    }

    /// Add a node for `path_spec` under `parent`, or return the existing
    /// node when the identity is already in the tree. Either way the node
    /// becomes `last_scan_node`.
    pub fn add_scan_node(&mut self, path_spec: Arc<PathSpec>, parent: Option<NodeId>) -> NodeId {
        let key = path_spec.comparable();
        if let Some(&existing) = self.by_key.get(&key) {
            trace!(key, "Scan node already present");
            self.last_scan_node = Some(existing);
            return existing;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(ScanNode {
            path_spec,
            parent,
            children: Vec::new(),
            scanned: false,
        }));
        self.by_key.insert(key, id);
        if let Some(parent_id) = parent {
            if let Some(Some(parent_node)) = self.nodes.get_mut(parent_id.0) {
                parent_node.children.push(id);
            }
        }
        self.last_scan_node = Some(id);
        trace!(?id, "Added scan node");
        id
    }

    /// Remove a childless node, unlinking it from its parent.
    ///
    /// Used to retract a tentative layer guess. When the removed node was
    /// the last visited, the pointer falls back to the former parent.
    pub fn remove_scan_node(&mut self, id: NodeId) -> VfsResult<Option<NodeId>> {
        let node = self
            .nodes
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| VfsError::InvalidSpec(format!("no scan node with id {}", id.0)))?;
        if !node.children.is_empty() {
            return Err(VfsError::InvalidSpec(
                "cannot remove a scan node that has children".to_string(),
            ));
        }
        let parent = node.parent;
        let key = node.path_spec.comparable();

        if let Some(parent_id) = parent {
            if let Some(Some(parent_node)) = self.nodes.get_mut(parent_id.0) {
                parent_node.children.retain(|&child| child != id);
            }
        }
        self.by_key.remove(&key);
        self.nodes[id.0] = None;
        if self.last_scan_node == Some(id) {
            self.last_scan_node = parent;
        }
        debug!(?id, "Removed scan node");
        Ok(parent)
    }

    pub fn node(&self, id: NodeId) -> Option<&ScanNode> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Look a node up by its path spec's canonical identity
    pub fn node_by_spec(&self, path_spec: &Arc<PathSpec>) -> Option<NodeId> {
        self.by_key.get(&path_spec.comparable()).copied()
    }

    /// The tree's root, when one has been opened
    pub fn root_node(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|slot| matches!(slot, Some(node) if node.parent.is_none()))
            .map(NodeId)
    }

    pub fn last_scan_node(&self) -> Option<NodeId> {
        self.last_scan_node
    }

    pub fn set_last_scan_node(&mut self, id: Option<NodeId>) {
        self.last_scan_node = id;
    }

    pub fn source_type(&self) -> Option<SourceType> {
        self.source_type
    }

    /// Classify the source; only the first classification sticks
    pub fn set_source_type(&mut self, source_type: SourceType) {
        if self.source_type.is_none() {
            debug!(?source_type, "Classified source");
            self.source_type = Some(source_type);
        }
    }

    pub fn mark_scanned(&mut self, id: NodeId) {
        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            node.scanned = true;
        }
    }

    /// Discovered-but-unprocessed nodes, in discovery order
    pub fn unscanned_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Some(node) if !node.scanned => Some(NodeId(idx)),
                _ => None,
            })
            .collect()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical identities of every live node, in discovery order
    pub fn comparables(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|slot| slot.as_ref().map(|node| node.path_spec.comparable()))
            .collect()
    }
}
