//! Capability provider boundary
//!
//! Format backends are the opaque per-type parsers (native bindings in a
//! full deployment). The core only reaches them through this narrow
//! interface: open a layer, read bytes at an offset, report a size, and
//! for file-system-capable layers, enumerate children.

mod os;
mod raw;

pub use os::OsBackend;
pub use raw::RawBackend;

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::resolver::ResolverContext;
use crate::spec::PathSpec;
use crate::volume::VolumeSystem;

// =============================================================================
// Provider Interface
// =============================================================================

/// An open layer: a positionless byte source plus optional child listing.
///
/// Positions live in the `ProviderHandle` that wraps a provider, so one
/// provider instance can back any number of handles.
pub trait CapabilityProvider {
    /// Read up to `buf.len()` bytes starting at `offset`.
    /// Returns 0 at or past end of data.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize>;

    /// Total size of this layer's byte stream
    fn size(&self) -> u64;

    /// Enumerate child path specs of `spec` within this layer.
    /// Only file-system-capable layers (and OS directories) support this.
    fn list_children(&self, spec: &PathSpec) -> VfsResult<Vec<Arc<PathSpec>>> {
        let _ = spec;
        Err(VfsError::BackEnd("layer does not enumerate children".to_string()))
    }
}

/// Result of asking a backend to open a layer.
///
/// `Locked` is the normal outcome for an encrypted layer with no usable
/// credential on record; it is not a failure.
pub enum OpenResult {
    Opened(Rc<dyn CapabilityProvider>),
    Locked,
}

impl fmt::Debug for OpenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenResult::Opened(_) => f.write_str("Opened(..)"),
            OpenResult::Locked => f.write_str("Locked"),
        }
    }
}

// =============================================================================
// Backend Interface
// =============================================================================

/// Constructor for one layer type's capability providers.
///
/// Backends are registered once at startup and shared read-only, so they
/// carry no open handles themselves. Opening a nested layer goes back
/// through the resolver context, which opens the parent spec recursively
/// and keeps at most one live provider per layer identity.
pub trait FormatBackend: Send + Sync {
    /// Open the layer described by `spec`
    fn open(&self, spec: &Arc<PathSpec>, ctx: &ResolverContext) -> VfsResult<OpenResult>;

    /// Expose the layer as a volume system (partition tables, snapshot
    /// containers). Only meaningful for multi-volume tags.
    fn open_volume_system(
        &self,
        spec: &Arc<PathSpec>,
        ctx: &ResolverContext,
    ) -> VfsResult<Box<dyn VolumeSystem>> {
        let _ = (spec, ctx);
        Err(VfsError::BackEnd("layer is not a volume system".to_string()))
    }
}
