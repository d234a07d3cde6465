//! Source scanner: recursive layer discovery
//!
//! Starting from an OS-level path, the scanner repeatedly asks the
//! analyzer whether the current frontier carries a storage media image,
//! a volume system, or a file system, growing the scan tree until every
//! frontier is terminal or external input is needed. Needing input is
//! not an error here: the scanner returns a suspension outcome and can
//! be re-invoked once a credential or volume selection is on record.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::analyzer::FormatAnalyzer;
use crate::error::{VfsError, VfsResult};
use crate::resolver::{OpenState, ResolverContext};
use crate::scan::tree::{NodeId, ScanContext, SourceType};
use crate::segments::{glob_raw_segments, matches_segment_schema};
use crate::spec::{PathSpec, SpecKind, TypeTag};
use crate::volume::volume_path_spec;

// =============================================================================
// Outcomes
// =============================================================================

/// How a `scan` call ended.
///
/// `Locked` and `SelectionRequired` are suspensions: the tree built so
/// far stays valid, and scanning resumes from the named node once the
/// missing input has been supplied.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Every frontier reached a terminal classification
    Completed,
    /// An encrypted layer has no usable credential on record
    Locked {
        node: NodeId,
        path_spec: Arc<PathSpec>,
    },
    /// A container holds several volumes and none was preselected
    SelectionRequired {
        node: NodeId,
        candidates: Vec<Arc<PathSpec>>,
    },
}

/// A storage-media-image detection hit
#[derive(Debug)]
pub struct ImageScanResult {
    /// Child path spec for the detected image layer
    pub path_spec: Arc<PathSpec>,
    /// Segment files confirmed by the naming-schema glob; None for
    /// signature-detected formats, which manage segments themselves
    pub segments: Option<Vec<PathBuf>>,
}

/// What processing one node decided
enum Step {
    /// Node is terminal
    Done,
    /// Process these nodes next, in the given order
    Children(Vec<NodeId>),
    /// Halt the whole scan pending external input
    Suspend(ScanOutcome),
}

// =============================================================================
// Scanner
// =============================================================================

/// Recursive layer-discovery driver over one resolver context
pub struct SourceScanner {
    analyzer: Box<dyn FormatAnalyzer>,
    resolver: ResolverContext,
}

impl SourceScanner {
    pub fn new(analyzer: Box<dyn FormatAnalyzer>, resolver: ResolverContext) -> Self {
        SourceScanner { analyzer, resolver }
    }

    /// The resolver context this scanner opens layers through.
    /// Credentials for locked layers are supplied here before resuming.
    pub fn resolver(&self) -> &ResolverContext {
        &self.resolver
    }

    /// Scan every unprocessed frontier of the tree.
    ///
    /// With `resume_at`, that previously discovered node is processed
    /// first; otherwise processing picks up from the unscanned nodes in
    /// discovery order. Suspension outcomes leave the suspended node
    /// unscanned so a later call retries it.
    pub fn scan(
        &self,
        sc: &mut ScanContext,
        resume_at: Option<&Arc<PathSpec>>,
    ) -> VfsResult<ScanOutcome> {
        if sc.is_empty() {
            return Err(VfsError::InvalidSpec(
                "scan context has no source; call open_source_path first".to_string(),
            ));
        }

        let mut queue: VecDeque<NodeId> = VecDeque::new();
        if let Some(spec) = resume_at {
            let id = sc.node_by_spec(spec).ok_or_else(|| {
                VfsError::InvalidSpec("resume point is not a discovered scan node".to_string())
            })?;
            queue.push_back(id);
        }
        for id in sc.unscanned_nodes() {
            if !queue.contains(&id) {
                queue.push_back(id);
            }
        }

        while let Some(id) = queue.pop_front() {
            // Retracted or already-finished nodes may linger in the queue
            match sc.node(id) {
                Some(node) if !node.is_scanned() => {}
                _ => continue,
            }
            match self.scan_node(sc, id)? {
                Step::Done => {}
                Step::Children(children) => {
                    // Depth-first: a frontier's layers resolve before
                    // its siblings
                    for (idx, child) in children.into_iter().enumerate() {
                        queue.insert(idx, child);
                    }
                }
                Step::Suspend(outcome) => {
                    info!(?outcome, "Scan suspended");
                    return Ok(outcome);
                }
            }
        }

        info!(nodes = sc.len(), source_type = ?sc.source_type(), "Scan completed");
        Ok(ScanOutcome::Completed)
    }

    // =========================================================================
    // Per-node state machine
    // =========================================================================

    fn scan_node(&self, sc: &mut ScanContext, id: NodeId) -> VfsResult<Step> {
        let spec = match sc.node(id) {
            Some(node) => Arc::clone(node.path_spec()),
            None => return Ok(Step::Done),
        };
        let tag = spec.type_tag();
        trace!(node = id.0, %tag, "Scanning node");

        // A file-system layer is terminal
        if tag.is_file_system() {
            sc.set_source_type(self.classify_media(&spec));
            sc.mark_scanned(id);
            return Ok(Step::Done);
        }

        if tag == TypeTag::Os {
            let location = spec.root_location().ok_or_else(|| {
                VfsError::InvalidSpec("OS layer without a location".to_string())
            })?;
            if Path::new(location).is_dir() {
                // Directories are never scanned further
                sc.set_source_type(SourceType::Directory);
                sc.mark_scanned(id);
                return Ok(Step::Done);
            }
            if let Some(image) = self.scan_for_storage_media_image(&spec)? {
                debug!(image = %image.path_spec.type_tag(), "Detected storage media image");
                let child = sc.add_scan_node(image.path_spec, Some(id));
                sc.mark_scanned(id);
                return Ok(Step::Children(vec![child]));
            }
            // No image layer: the volume/file-system probes below run
            // against the OS path directly (plain partitioned device)
        }

        // Encrypted wrapper: nothing beneath is visible until unlocked
        if tag.is_encrypted() {
            match self.resolver.try_open(&spec)? {
                OpenState::Locked => {
                    warn!(%tag, "Encrypted layer is locked, awaiting credential");
                    sc.set_last_scan_node(Some(id));
                    return Ok(Step::Suspend(ScanOutcome::Locked { node: id, path_spec: spec }));
                }
                OpenState::Open(handle) => drop(handle),
            }
            return self.scan_file_system_layer(sc, id, &spec, false);
        }

        // An unaddressed container expands into its volumes; an addressed
        // volume (entry/store/volume index present) falls through to the
        // detection probes like any other frontier
        if tag.is_multi_volume() && spec.kind().attributes().is_empty() {
            return self.scan_volume_children(sc, id, &spec);
        }

        if let Some(volume_spec) = self.scan_for_volume_system(&spec)? {
            let volume_tag = volume_spec.type_tag();
            debug!(%volume_tag, "Detected volume system");
            let mut children = vec![sc.add_scan_node(volume_spec, Some(id))];
            if volume_tag.is_snapshot() {
                // The unsnapshotted volume stays directly readable next
                // to its snapshot container
                if let Some(fs_spec) = self.scan_for_file_system(&spec)? {
                    children.push(sc.add_scan_node(fs_spec, Some(id)));
                }
            }
            sc.mark_scanned(id);
            return Ok(Step::Children(children));
        }

        self.scan_file_system_layer(sc, id, &spec, tag == TypeTag::Raw)
    }

    /// Final detection step for a frontier: find a file system or settle
    /// on a terminal classification. A raw-image node that was only a
    /// naming-schema guess gets retracted when nothing is found inside.
    fn scan_file_system_layer(
        &self,
        sc: &mut ScanContext,
        id: NodeId,
        spec: &Arc<PathSpec>,
        retract_on_miss: bool,
    ) -> VfsResult<Step> {
        match self.scan_for_file_system(spec)? {
            Some(fs_spec) => {
                debug!(fs = %fs_spec.type_tag(), "Detected file system");
                let child = sc.add_scan_node(fs_spec, Some(id));
                sc.mark_scanned(id);
                Ok(Step::Children(vec![child]))
            }
            None if retract_on_miss => {
                debug!("No file system inside guessed raw image, retracting");
                sc.remove_scan_node(id)?;
                sc.set_source_type(SourceType::File);
                Ok(Step::Done)
            }
            None => {
                sc.set_source_type(SourceType::File);
                sc.mark_scanned(id);
                Ok(Step::Done)
            }
        }
    }

    /// Expand a multi-volume container into per-volume child nodes.
    ///
    /// With more than one volume and no preselected children the scan
    /// halts; the caller picks volumes (adding child nodes) and resumes.
    /// Snapshot stores are listed oldest to newest but processed most
    /// recent first.
    fn scan_volume_children(
        &self,
        sc: &mut ScanContext,
        id: NodeId,
        spec: &Arc<PathSpec>,
    ) -> VfsResult<Step> {
        let tag = spec.type_tag();

        let preselected: Vec<NodeId> = sc
            .node(id)
            .map(|node| node.children().to_vec())
            .unwrap_or_default();
        if !preselected.is_empty() {
            let mut children = preselected;
            if tag.is_snapshot() {
                children.reverse();
            }
            sc.mark_scanned(id);
            return Ok(Step::Children(children));
        }

        let backend = Arc::clone(self.resolver.registry().backend(tag)?);
        let volume_system = backend.open_volume_system(spec, &self.resolver)?;
        let volumes = volume_system.volumes();
        debug!(%tag, count = volumes.len(), "Enumerated volume system");

        match volumes.len() {
            0 => Err(VfsError::BackEnd(format!("{} volume system holds no volumes", tag))),
            1 => {
                let child_spec = volume_path_spec(spec, &volumes[0])?;
                let child = sc.add_scan_node(child_spec, Some(id));
                sc.mark_scanned(id);
                Ok(Step::Children(vec![child]))
            }
            _ => {
                let mut candidates = Vec::with_capacity(volumes.len());
                for volume in volumes {
                    candidates.push(volume_path_spec(spec, volume)?);
                }
                sc.set_last_scan_node(Some(id));
                Ok(Step::Suspend(ScanOutcome::SelectionRequired { node: id, candidates }))
            }
        }
    }

    /// Terminal classification for a non-directory source: block devices
    /// scan as devices, everything else as an image.
    fn classify_media(&self, spec: &Arc<PathSpec>) -> SourceType {
        let is_device = spec
            .root_location()
            .map(is_block_device)
            .unwrap_or(false);
        if is_device {
            SourceType::StorageMediaDevice
        } else {
            SourceType::StorageMediaImage
        }
    }

    // =========================================================================
    // Standalone probes
    // =========================================================================
    // Idempotent queries over a single layer; none of these touch a scan
    // context, so callers can probe a known layer directly.

    /// Detect a storage media image inside `spec`.
    ///
    /// Zero signature matches falls back to the raw naming-schema glob;
    /// more than one match is an ambiguity failure.
    pub fn scan_for_storage_media_image(
        &self,
        spec: &Arc<PathSpec>,
    ) -> VfsResult<Option<ImageScanResult>> {
        let matches = self.analyzer.match_storage_image(spec, &self.resolver)?;
        if matches.len() > 1 {
            return Err(VfsError::AmbiguousFormat(matches.into_iter().collect()));
        }
        if let Some(&tag) = matches.iter().next() {
            let kind = SpecKind::default_for(tag).ok_or_else(|| {
                VfsError::InvalidSpec(format!("{} cannot be detected as an image layer", tag))
            })?;
            return Ok(Some(ImageScanResult {
                path_spec: PathSpec::new(kind, Some(spec))?,
                segments: None,
            }));
        }

        // Raw images have no signature; their segment naming schema is
        // the only tell, confirmed by globbing the first segment
        if spec.type_tag() == TypeTag::Os {
            if let Some(location) = spec.root_location() {
                let path = Path::new(location);
                let schema_match = path
                    .file_name()
                    .map(|name| matches_segment_schema(&name.to_string_lossy()))
                    .unwrap_or(false);
                if schema_match {
                    if let Some(segments) = glob_raw_segments(path) {
                        return Ok(Some(ImageScanResult {
                            path_spec: PathSpec::new(SpecKind::Raw, Some(spec))?,
                            segments: Some(segments),
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Detect a volume system (or encrypted/snapshot wrapper) inside `spec`
    pub fn scan_for_volume_system(&self, spec: &Arc<PathSpec>) -> VfsResult<Option<Arc<PathSpec>>> {
        let matches = self.analyzer.match_volume_system(spec, &self.resolver)?;
        self.single_match_child(spec, matches)
    }

    /// Detect a file system inside `spec`
    pub fn scan_for_file_system(&self, spec: &Arc<PathSpec>) -> VfsResult<Option<Arc<PathSpec>>> {
        let matches = self.analyzer.match_file_system(spec, &self.resolver)?;
        self.single_match_child(spec, matches)
    }

    fn single_match_child(
        &self,
        spec: &Arc<PathSpec>,
        matches: std::collections::BTreeSet<TypeTag>,
    ) -> VfsResult<Option<Arc<PathSpec>>> {
        match matches.len() {
            0 => Ok(None),
            1 => {
                let tag = *matches.iter().next().unwrap();
                let kind = SpecKind::default_for(tag).ok_or_else(|| {
                    VfsError::InvalidSpec(format!("{} cannot be detected by signature", tag))
                })?;
                Ok(Some(PathSpec::new(kind, Some(spec))?))
            }
            _ => Err(VfsError::AmbiguousFormat(matches.into_iter().collect())),
        }
    }
}

#[cfg(unix)]
fn is_block_device(location: &str) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(location)
        .map(|meta| meta.file_type().is_block_device())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_block_device(_location: &str) -> bool {
    false
}
