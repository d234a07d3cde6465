//! Format registry: maps layer type tags to their backends
//!
//! One registry is built at process start, populated with every backend
//! the deployment supports, and then shared read-only. Resolver contexts
//! and scanners receive it by reference; there is no global state.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::backend::FormatBackend;
use crate::error::{VfsError, VfsResult};
use crate::spec::{AttributeBag, PathSpec, TypeTag};

/// Registry of format backends keyed by type tag
pub struct FormatRegistry {
    backends: HashMap<TypeTag, Arc<dyn FormatBackend>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        FormatRegistry { backends: HashMap::new() }
    }

    /// Register the backend for a type tag.
    /// Fails with `DuplicateType` if the tag is already registered.
    pub fn register(&mut self, tag: TypeTag, backend: Arc<dyn FormatBackend>) -> VfsResult<()> {
        if self.backends.contains_key(&tag) {
            return Err(VfsError::DuplicateType(tag));
        }
        debug!(%tag, "Registered format backend");
        self.backends.insert(tag, backend);
        Ok(())
    }

    /// Remove the backend for a type tag.
    /// Fails with `UnknownType` if the tag was never registered.
    pub fn deregister(&mut self, tag: TypeTag) -> VfsResult<()> {
        if self.backends.remove(&tag).is_none() {
            return Err(VfsError::UnknownType(tag));
        }
        debug!(%tag, "Deregistered format backend");
        Ok(())
    }

    /// Look up the backend for a type tag
    pub fn backend(&self, tag: TypeTag) -> VfsResult<&Arc<dyn FormatBackend>> {
        self.backends.get(&tag).ok_or(VfsError::UnknownType(tag))
    }

    /// Check whether a tag has a registered backend
    pub fn is_registered(&self, tag: TypeTag) -> bool {
        self.backends.contains_key(&tag)
    }

    /// Build a path spec for a registered tag from an attribute bag.
    ///
    /// The tag must be registered; attribute and parent validation follow
    /// the usual path spec rules.
    pub fn new_path_spec(
        &self,
        tag: TypeTag,
        attrs: &AttributeBag,
        parent: Option<&Arc<PathSpec>>,
    ) -> VfsResult<Arc<PathSpec>> {
        if !self.is_registered(tag) {
            return Err(VfsError::UnknownType(tag));
        }
        PathSpec::from_attributes(tag, attrs, parent)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
