//! Format analysis: which layer types match a spec's bytes
//!
//! The scanner never inspects bytes itself; it asks an analyzer which
//! type tags' signatures match the layer under a given path spec. The
//! trait keeps analyzers side-effect-free: a probe may open the layer
//! for reading but must not keep any handle beyond the call.

mod signatures;

pub use signatures::SignatureAnalyzer;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::VfsResult;
use crate::resolver::ResolverContext;
use crate::spec::{PathSpec, TypeTag};

/// Signature matcher consumed by the source scanner.
///
/// Each method returns the set of tags in its family whose on-disk
/// signature matches the bytes reachable through `spec`. Implementations
/// must be idempotent and must not retain open handles.
pub trait FormatAnalyzer {
    /// Storage media image formats (EWF, QCOW, VHD, ...)
    fn match_storage_image(
        &self,
        spec: &Arc<PathSpec>,
        ctx: &ResolverContext,
    ) -> VfsResult<BTreeSet<TypeTag>>;

    /// Volume systems, snapshot containers, and encrypted wrappers
    fn match_volume_system(
        &self,
        spec: &Arc<PathSpec>,
        ctx: &ResolverContext,
    ) -> VfsResult<BTreeSet<TypeTag>>;

    /// File systems (terminal layers)
    fn match_file_system(
        &self,
        spec: &Arc<PathSpec>,
        ctx: &ResolverContext,
    ) -> VfsResult<BTreeSet<TypeTag>>;
}
