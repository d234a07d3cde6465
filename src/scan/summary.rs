//! Serializable summary of a scan's findings
//!
//! Downstream tooling wants a plain data description of what a scan
//! found: the source, its classification, and the discovered layer tree.
//! The summary is a snapshot; it does not keep the scan context alive.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::SystemTime;
use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::scan::tree::{NodeId, ScanContext, SourceType};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One discovered layer, with its sub-layers nested beneath it
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub type_tag: String,
    /// Canonical identity of the layer's path spec
    pub identity: String,
    pub children: Vec<NodeSummary>,
}

/// Snapshot of a completed or suspended scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// OS-level location the scan started from
    pub source: Option<String>,
    pub source_type: Option<SourceType>,
    pub node_count: usize,
    /// When this summary was generated
    pub generated: String,
    /// Last-modified time of the source path, when available
    pub source_modified: Option<String>,
    pub tree: Option<NodeSummary>,
}

impl ScanSummary {
    /// Capture the current state of a scan context
    pub fn from_context(sc: &ScanContext) -> Self {
        let root = sc.root_node();
        let source = root
            .and_then(|id| sc.node(id))
            .and_then(|node| node.path_spec().root_location().map(String::from));
        let source_modified = source
            .as_deref()
            .and_then(|location| std::fs::metadata(location).ok())
            .and_then(|meta| meta.modified().ok())
            .map(format_timestamp);

        let summary = ScanSummary {
            source,
            source_type: sc.source_type(),
            node_count: sc.len(),
            generated: format_timestamp(SystemTime::now()),
            source_modified,
            tree: root.map(|id| summarize_node(sc, id)),
        };
        debug!(nodes = summary.node_count, "Built scan summary");
        summary
    }

    pub fn to_json(&self) -> VfsResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VfsError::BackEnd(format!("failed to serialize scan summary: {}", e)))
    }
}

fn summarize_node(sc: &ScanContext, id: NodeId) -> NodeSummary {
    let node = sc.node(id).expect("summarized node exists");
    NodeSummary {
        type_tag: node.path_spec().type_tag().to_string(),
        identity: node.path_spec().comparable(),
        children: node
            .children()
            .iter()
            .map(|&child| summarize_node(sc, child))
            .collect(),
    }
}

fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(TIMESTAMP_FORMAT).to_string()
}
