//! Uniform volume-system view over detected container layers
//!
//! Partition tables, snapshot containers, and logical volume managers all
//! reduce to the same shape here: an ordered list of logical volumes with
//! attributes and typed extents. Ordering is the on-disk/table order,
//! never sorted; the scanner and any selection UI depend on that.

use serde::Serialize;
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::spec::{PathSpec, SpecKind, TypeTag};

// =============================================================================
// Types
// =============================================================================

/// Whether an extent carries data or is a sparse hole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtentKind {
    Data,
    Sparse,
}

/// One contiguous region of a volume within its parent layer
#[derive(Debug, Clone, Serialize)]
pub struct VolumeExtent {
    pub offset: u64,
    pub size: u64,
    pub kind: ExtentKind,
}

/// Name/value attribute of a volume (creation time, store identifier, ...)
#[derive(Debug, Clone, Serialize)]
pub struct VolumeAttribute {
    pub name: String,
    pub value: String,
}

/// One logical volume inside a volume system
#[derive(Debug, Clone, Serialize)]
pub struct Volume {
    /// Zero-based position in the volume system's own order
    pub index: u32,
    /// Volume-system-specific identifier ("p1", "vss2", ...)
    pub identifier: String,
    pub attributes: Vec<VolumeAttribute>,
    pub extents: Vec<VolumeExtent>,
}

impl Volume {
    pub fn new(index: u32, identifier: impl Into<String>) -> Self {
        Volume {
            index,
            identifier: identifier.into(),
            attributes: Vec::new(),
            extents: Vec::new(),
        }
    }
}

/// A detected volume-system layer's logical volumes, in on-disk order
pub trait VolumeSystem {
    fn volumes(&self) -> &[Volume];
}

// =============================================================================
// Child path specs
// =============================================================================

/// Path spec addressing one volume inside a container layer.
///
/// The child shares the container's spec as its parent; every volume of
/// the same container therefore shares one parent instance.
pub fn volume_path_spec(container: &Arc<PathSpec>, volume: &Volume) -> VfsResult<Arc<PathSpec>> {
    let kind = match container.type_tag() {
        TypeTag::Partition => SpecKind::Partition {
            location: Some(format!("/p{}", volume.index + 1)),
            entry_index: Some(volume.index),
        },
        TypeTag::Gpt => SpecKind::Gpt { entry_index: Some(volume.index) },
        TypeTag::Apm => SpecKind::Apm { entry_index: Some(volume.index) },
        TypeTag::Lvm => SpecKind::Lvm { volume_index: Some(volume.index) },
        TypeTag::Vshadow => SpecKind::Vshadow { store_index: Some(volume.index) },
        TypeTag::ApfsContainer => SpecKind::ApfsContainer { volume_index: Some(volume.index) },
        TypeTag::CoreStorage => SpecKind::CoreStorage { volume_index: Some(volume.index) },
        tag => {
            return Err(VfsError::InvalidSpec(format!(
                "{} is not a multi-volume container",
                tag
            )))
        }
    };
    PathSpec::new(kind, Some(container))
}
