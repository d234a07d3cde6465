//! Dynamic attribute bags for path spec construction
//!
//! The typed `SpecKind` enum is the primary construction path. The bag
//! form exists for callers that assemble specs from parsed input, and
//! for cloning a spec with adjusted fields (segment globbing does this).
//! Validation mirrors the typed form: an unrecognized attribute name or
//! a missing required field is an `InvalidSpec` contract violation.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{VfsError, VfsResult};
use crate::spec::kind::{SpecKind, TypeTag};

/// One attribute value in a bag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Str(String),
    U32(u32),
    U64(u64),
}

impl AttrValue {
    fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            AttrValue::U32(v) => Some(*v),
            AttrValue::U64(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::U64(v) => Some(*v),
            AttrValue::U32(v) => Some(u64::from(*v)),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::U32(v) => write!(f, "{}", v),
            AttrValue::U64(v) => write!(f, "{}", v),
        }
    }
}

/// Named attributes for bag-based construction, ordered by name
pub type AttributeBag = BTreeMap<String, AttrValue>;

// =============================================================================
// Bag -> SpecKind
// =============================================================================

/// Build a `SpecKind` for `tag` from an attribute bag.
///
/// Fails with `InvalidSpec` when the bag contains a name the tag does not
/// support, a value of the wrong shape, or omits a required field.
pub fn kind_from_attributes(tag: TypeTag, attrs: &AttributeBag) -> VfsResult<SpecKind> {
    let mut reader = BagReader::new(tag, attrs);
    let kind = match tag {
        TypeTag::Os => SpecKind::Os { location: reader.required_str("location")? },
        TypeTag::Raw => SpecKind::Raw,
        TypeTag::Ewf => SpecKind::Ewf,
        TypeTag::Qcow => SpecKind::Qcow,
        TypeTag::Vhd => SpecKind::Vhd,
        TypeTag::Vhdx => SpecKind::Vhdx,
        TypeTag::Vmdk => SpecKind::Vmdk,
        TypeTag::Vdi => SpecKind::Vdi,
        TypeTag::Partition => SpecKind::Partition {
            location: reader.optional_str("location")?,
            entry_index: reader.optional_u32("entry_index")?,
        },
        TypeTag::Gpt => SpecKind::Gpt { entry_index: reader.optional_u32("entry_index")? },
        TypeTag::Apm => SpecKind::Apm { entry_index: reader.optional_u32("entry_index")? },
        TypeTag::Lvm => SpecKind::Lvm { volume_index: reader.optional_u32("volume_index")? },
        TypeTag::Vshadow => SpecKind::Vshadow { store_index: reader.optional_u32("store_index")? },
        TypeTag::ApfsContainer => {
            SpecKind::ApfsContainer { volume_index: reader.optional_u32("volume_index")? }
        }
        TypeTag::CoreStorage => {
            SpecKind::CoreStorage { volume_index: reader.optional_u32("volume_index")? }
        }
        TypeTag::Bde => SpecKind::Bde { password: reader.optional_str("password")? },
        TypeTag::Luks => SpecKind::Luks { password: reader.optional_str("password")? },
        TypeTag::FileVault => SpecKind::FileVault { password: reader.optional_str("password")? },
        TypeTag::Ntfs => SpecKind::Ntfs {
            location: reader.optional_str("location")?,
            mft_entry: reader.optional_u64("mft_entry")?,
        },
        TypeTag::Ext => SpecKind::Ext {
            location: reader.optional_str("location")?,
            inode: reader.optional_u64("inode")?,
        },
        TypeTag::Fat => SpecKind::Fat { location: reader.optional_str("location")? },
        TypeTag::Hfs => SpecKind::Hfs {
            location: reader.optional_str("location")?,
            identifier: reader.optional_u64("identifier")?,
        },
        TypeTag::Apfs => SpecKind::Apfs {
            location: reader.optional_str("location")?,
            identifier: reader.optional_u64("identifier")?,
        },
        TypeTag::Iso => SpecKind::Iso { location: reader.optional_str("location")? },
        TypeTag::Range => SpecKind::Range {
            range_offset: reader.required_u64("range_offset")?,
            range_size: reader.required_u64("range_size")?,
        },
    };
    reader.finish()?;
    Ok(kind)
}

/// Extract the recognized, present attributes of a kind as a bag.
///
/// Inverse of `kind_from_attributes` for present fields; used when
/// cloning a spec with one field adjusted.
pub fn properties(kind: &SpecKind) -> AttributeBag {
    let mut bag = AttributeBag::new();
    for (name, value) in kind.attributes() {
        // Numeric fields re-enter the bag as u64, string fields as-is.
        // The reader on the way back accepts either width.
        let attr = match value.parse::<u64>() {
            Ok(v) if !matches!(name, "location" | "password") => AttrValue::U64(v),
            _ => AttrValue::Str(value),
        };
        bag.insert(name.to_string(), attr);
    }
    bag
}

// =============================================================================
// Bag reader
// =============================================================================

/// Tracks which bag keys were consumed so leftovers can be rejected
struct BagReader<'a> {
    tag: TypeTag,
    attrs: &'a AttributeBag,
    consumed: Vec<&'static str>,
}

impl<'a> BagReader<'a> {
    fn new(tag: TypeTag, attrs: &'a AttributeBag) -> Self {
        BagReader { tag, attrs, consumed: Vec::new() }
    }

    fn required_str(&mut self, name: &'static str) -> VfsResult<String> {
        self.optional_str(name)?.ok_or_else(|| {
            VfsError::InvalidSpec(format!("{} requires attribute '{}'", self.tag, name))
        })
    }

    fn required_u64(&mut self, name: &'static str) -> VfsResult<u64> {
        self.optional_u64(name)?.ok_or_else(|| {
            VfsError::InvalidSpec(format!("{} requires attribute '{}'", self.tag, name))
        })
    }

    fn optional_str(&mut self, name: &'static str) -> VfsResult<Option<String>> {
        self.consumed.push(name);
        match self.attrs.get(name) {
            None => Ok(None),
            Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
                VfsError::InvalidSpec(format!("attribute '{}' must be a string", name))
            }),
        }
    }

    fn optional_u32(&mut self, name: &'static str) -> VfsResult<Option<u32>> {
        self.consumed.push(name);
        match self.attrs.get(name) {
            None => Ok(None),
            Some(v) => v.as_u32().map(Some).ok_or_else(|| {
                VfsError::InvalidSpec(format!("attribute '{}' must be an integer", name))
            }),
        }
    }

    fn optional_u64(&mut self, name: &'static str) -> VfsResult<Option<u64>> {
        self.consumed.push(name);
        match self.attrs.get(name) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                VfsError::InvalidSpec(format!("attribute '{}' must be an integer", name))
            }),
        }
    }

    fn finish(self) -> VfsResult<()> {
        for name in self.attrs.keys() {
            if !self.consumed.contains(&name.as_str()) {
                return Err(VfsError::InvalidSpec(format!(
                    "{} does not support attribute '{}'",
                    self.tag, name
                )));
            }
        }
        Ok(())
    }
}
