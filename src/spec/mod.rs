//! Path specifications: immutable, parent-linked layer descriptors
//!
//! A `PathSpec` names one layer of a storage source together with the
//! chain of layers it sits on. The chain renders into a canonical
//! "comparable" string that defines identity, equality, hashing, and
//! every cache/tree key in the crate.

mod attrs;
mod kind;

pub use attrs::{kind_from_attributes, properties, AttrValue, AttributeBag};
pub use kind::{SpecKind, TypeTag};

use std::sync::Arc;

use crate::error::{VfsError, VfsResult};

// =============================================================================
// PathSpec
// =============================================================================

/// An immutable layer descriptor with a shared link to its parent layer.
///
/// A spec owns its attributes and shares (never owns) its parent; several
/// children can sit on the same parent, as VSS stores do on one volume.
/// Equality and hashing are structural and coincide with comparable-string
/// equality because every attribute renders injectively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSpec {
    kind: SpecKind,
    parent: Option<Arc<PathSpec>>,
}

impl PathSpec {
    /// Create a new path spec.
    ///
    /// Fails with `InvalidSpec` when a non-root tag has no parent or a
    /// root tag is given one. Invalid construction is a contract
    /// violation, not a recoverable value.
    pub fn new(kind: SpecKind, parent: Option<&Arc<PathSpec>>) -> VfsResult<Arc<PathSpec>> {
        let tag = kind.tag();
        match (tag.is_root(), parent) {
            (true, Some(_)) => {
                return Err(VfsError::InvalidSpec(format!("{} layers do not take a parent", tag)))
            }
            (false, None) => {
                return Err(VfsError::InvalidSpec(format!("{} layers require a parent", tag)))
            }
            _ => {}
        }
        Ok(Arc::new(PathSpec { kind, parent: parent.map(Arc::clone) }))
    }

    /// Convenience constructor for the OS-level root layer
    pub fn os(location: impl Into<String>) -> Arc<PathSpec> {
        Arc::new(PathSpec {
            kind: SpecKind::Os { location: location.into() },
            parent: None,
        })
    }

    /// Bag-based constructor used by dynamic callers (see `attrs`)
    pub fn from_attributes(
        tag: TypeTag,
        attrs: &AttributeBag,
        parent: Option<&Arc<PathSpec>>,
    ) -> VfsResult<Arc<PathSpec>> {
        let kind = kind_from_attributes(tag, attrs)?;
        PathSpec::new(kind, parent)
    }

    /// This layer's type tag
    pub fn type_tag(&self) -> TypeTag {
        self.kind.tag()
    }

    /// This layer's attributes
    pub fn kind(&self) -> &SpecKind {
        &self.kind
    }

    /// Shared parent layer, if any
    pub fn parent(&self) -> Option<&Arc<PathSpec>> {
        self.parent.as_ref()
    }

    /// Walk to the OS-level root of the chain
    pub fn root(&self) -> &PathSpec {
        let mut cur = self;
        while let Some(parent) = cur.parent.as_deref() {
            cur = parent;
        }
        cur
    }

    /// OS-level location of the chain root, when the root is an OS layer
    pub fn root_location(&self) -> Option<&str> {
        match self.root().kind() {
            SpecKind::Os { location } => Some(location),
            _ => None,
        }
    }

    /// Canonical identity string: every layer from root to leaf rendered
    /// as `type: TAG[, attr: value]*`, one line per layer.
    ///
    /// Two specs are equal, hash identically, and are cache-interchangeable
    /// iff this string matches exactly.
    pub fn comparable(&self) -> String {
        let mut chain = Vec::new();
        let mut cur = Some(self);
        while let Some(spec) = cur {
            chain.push(spec);
            cur = spec.parent.as_deref();
        }
        chain.reverse();
        chain
            .iter()
            .map(|spec| spec.kind.describe())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Recognized, present fields of this layer as an attribute bag.
    /// Used for cloning a spec with adjusted fields.
    pub fn properties(&self) -> AttributeBag {
        properties(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_forbids_parent() {
        let root = PathSpec::os("/evidence/image.qcow2");
        let err = PathSpec::new(
            SpecKind::Os { location: "/x".to_string() },
            Some(&root),
        )
        .unwrap_err();
        assert!(matches!(err, VfsError::InvalidSpec(_)));
    }

    #[test]
    fn test_non_root_requires_parent() {
        let err = PathSpec::new(SpecKind::Qcow, None).unwrap_err();
        assert!(matches!(err, VfsError::InvalidSpec(_)));
    }

    #[test]
    fn test_comparable_renders_root_to_leaf() {
        let os = PathSpec::os("/evidence/image.qcow2");
        let qcow = PathSpec::new(SpecKind::Qcow, Some(&os)).unwrap();
        let vss = PathSpec::new(SpecKind::Vshadow { store_index: Some(1) }, Some(&qcow)).unwrap();

        assert_eq!(
            vss.comparable(),
            "type: OS, location: /evidence/image.qcow2\ntype: QCOW\ntype: VSHADOW, store_index: 1"
        );
    }

    #[test]
    fn test_equal_chains_compare_equal() {
        let build = || {
            let os = PathSpec::os("/evidence/disk.raw");
            let raw = PathSpec::new(SpecKind::Raw, Some(&os)).unwrap();
            PathSpec::new(SpecKind::Vshadow { store_index: Some(2) }, Some(&raw)).unwrap()
        };
        let a = build();
        let b = build();
        assert_eq!(a, b);
        assert_eq!(a.comparable(), b.comparable());

        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let hash = |spec: &PathSpec| {
            let mut h = DefaultHasher::new();
            spec.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_absent_fields_change_identity() {
        let os = PathSpec::os("/evidence/disk.raw");
        let with = PathSpec::new(SpecKind::Vshadow { store_index: Some(0) }, Some(&os)).unwrap();
        let without = PathSpec::new(SpecKind::Vshadow { store_index: None }, Some(&os)).unwrap();
        assert_ne!(with, without);
        assert_ne!(with.comparable(), without.comparable());
        // Absent field is omitted, not rendered empty
        assert!(!without.comparable().contains("store_index"));
    }

    #[test]
    fn test_shared_parent() {
        let os = PathSpec::os("/evidence/disk.raw");
        let vss = PathSpec::new(SpecKind::Vshadow { store_index: None }, Some(&os)).unwrap();
        let store1 = PathSpec::new(SpecKind::Vshadow { store_index: Some(0) }, Some(&vss)).unwrap();
        let store2 = PathSpec::new(SpecKind::Vshadow { store_index: Some(1) }, Some(&vss)).unwrap();
        assert!(Arc::ptr_eq(store1.parent().unwrap(), store2.parent().unwrap()));
    }

    #[test]
    fn test_root_location() {
        let os = PathSpec::os("/dev/sdb");
        let part = PathSpec::new(
            SpecKind::Partition { location: Some("/p1".to_string()), entry_index: Some(0) },
            Some(&os),
        )
        .unwrap();
        assert_eq!(part.root_location(), Some("/dev/sdb"));
    }

    #[test]
    fn test_from_attributes_builds_same_spec() {
        let os = PathSpec::os("/evidence/disk.raw");
        let typed = PathSpec::new(SpecKind::Ext { location: None, inode: Some(2) }, Some(&os)).unwrap();
        let bagged = PathSpec::from_attributes(TypeTag::Ext, &typed.properties(), Some(&os)).unwrap();
        assert_eq!(typed, bagged);
    }
}
