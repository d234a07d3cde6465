//! Layer type tags and the closed set of per-layer attributes
//!
//! Every supported layer kind is one variant of `SpecKind`. Each variant
//! only carries the fields that layer actually uses, so an unsupported
//! attribute is impossible to construct rather than a runtime error.

use serde::Serialize;
use std::fmt;

// =============================================================================
// Type Tags
// =============================================================================

/// Identifies one kind of storage layer.
///
/// Tags fall into three detection families used by the scanner: storage
/// media images, volume systems (including snapshot containers and
/// encrypted wrappers), and file systems. `Os` is the only root tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TypeTag {
    /// OS-level path (file, directory, or block device)
    Os,
    /// Raw disk image (no signature, detected via naming schemas)
    Raw,
    /// EnCase Expert Witness Format image
    Ewf,
    /// QEMU copy-on-write image
    Qcow,
    /// Virtual Hard Disk (fixed/dynamic, trailer signature)
    Vhd,
    /// Virtual Hard Disk v2
    Vhdx,
    /// VMware disk image
    Vmdk,
    /// VirtualBox disk image
    Vdi,
    /// MBR-style partition table
    Partition,
    /// GUID partition table
    Gpt,
    /// Apple partition map
    Apm,
    /// Linux logical volume manager
    Lvm,
    /// Volume Shadow Snapshot container
    Vshadow,
    /// APFS container (holds one or more APFS volumes)
    ApfsContainer,
    /// Apple Core Storage container
    CoreStorage,
    /// BitLocker drive encryption wrapper
    Bde,
    /// LUKS drive encryption wrapper
    Luks,
    /// FileVault drive encryption wrapper
    FileVault,
    /// NTFS file system
    Ntfs,
    /// EXT2/3/4 file system
    Ext,
    /// FAT12/16/32 file system
    Fat,
    /// HFS+ file system
    Hfs,
    /// APFS file system (one volume inside a container)
    Apfs,
    /// ISO 9660 file system
    Iso,
    /// Byte range inside the parent layer
    Range,
}

impl TypeTag {
    /// Canonical tag name used in the comparable string
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Os => "OS",
            TypeTag::Raw => "RAW",
            TypeTag::Ewf => "EWF",
            TypeTag::Qcow => "QCOW",
            TypeTag::Vhd => "VHD",
            TypeTag::Vhdx => "VHDX",
            TypeTag::Vmdk => "VMDK",
            TypeTag::Vdi => "VDI",
            TypeTag::Partition => "PARTITION",
            TypeTag::Gpt => "GPT",
            TypeTag::Apm => "APM",
            TypeTag::Lvm => "LVM",
            TypeTag::Vshadow => "VSHADOW",
            TypeTag::ApfsContainer => "APFS_CONTAINER",
            TypeTag::CoreStorage => "CS",
            TypeTag::Bde => "BDE",
            TypeTag::Luks => "LUKS",
            TypeTag::FileVault => "FVDE",
            TypeTag::Ntfs => "NTFS",
            TypeTag::Ext => "EXT",
            TypeTag::Fat => "FAT",
            TypeTag::Hfs => "HFS",
            TypeTag::Apfs => "APFS",
            TypeTag::Iso => "ISO",
            TypeTag::Range => "RANGE",
        }
    }

    /// Root tags identify an OS-level location and forbid a parent
    pub fn is_root(&self) -> bool {
        matches!(self, TypeTag::Os)
    }

    /// Storage media image family (detected in scan step 2)
    pub fn is_storage_image(&self) -> bool {
        matches!(
            self,
            TypeTag::Raw
                | TypeTag::Ewf
                | TypeTag::Qcow
                | TypeTag::Vhd
                | TypeTag::Vhdx
                | TypeTag::Vmdk
                | TypeTag::Vdi
        )
    }

    /// Volume system family (detected in scan step 3), including
    /// snapshot containers and encrypted wrappers
    pub fn is_volume_system(&self) -> bool {
        matches!(
            self,
            TypeTag::Partition
                | TypeTag::Gpt
                | TypeTag::Apm
                | TypeTag::Lvm
                | TypeTag::Vshadow
                | TypeTag::ApfsContainer
                | TypeTag::CoreStorage
                | TypeTag::Bde
                | TypeTag::Luks
                | TypeTag::FileVault
        )
    }

    /// File system family (detected in scan step 4, terminal)
    pub fn is_file_system(&self) -> bool {
        matches!(
            self,
            TypeTag::Ntfs
                | TypeTag::Ext
                | TypeTag::Fat
                | TypeTag::Hfs
                | TypeTag::Apfs
                | TypeTag::Iso
        )
    }

    /// Encrypted wrappers halt the scan until a credential unlocks them
    pub fn is_encrypted(&self) -> bool {
        matches!(self, TypeTag::Bde | TypeTag::Luks | TypeTag::FileVault)
    }

    /// Snapshot containers also get a file-system probe on their parent
    pub fn is_snapshot(&self) -> bool {
        matches!(self, TypeTag::Vshadow)
    }

    /// Containers that carry multiple logical volumes
    pub fn is_multi_volume(&self) -> bool {
        matches!(
            self,
            TypeTag::Partition
                | TypeTag::Gpt
                | TypeTag::Apm
                | TypeTag::Lvm
                | TypeTag::Vshadow
                | TypeTag::ApfsContainer
                | TypeTag::CoreStorage
        )
    }

    /// Credential names the key chain accepts for this layer type
    pub fn supported_credentials(&self) -> &'static [&'static str] {
        match self {
            TypeTag::Bde => &["password", "recovery_password", "startup_key"],
            TypeTag::Luks => &["password"],
            TypeTag::FileVault => &["password"],
            _ => &[],
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Per-Layer Attributes
// =============================================================================

/// One layer's type tag plus its type-specific attributes.
///
/// Optional fields are omitted from the comparable string when absent,
/// never rendered as empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecKind {
    Os { location: String },
    Raw,
    Ewf,
    Qcow,
    Vhd,
    Vhdx,
    Vmdk,
    Vdi,
    Partition { location: Option<String>, entry_index: Option<u32> },
    Gpt { entry_index: Option<u32> },
    Apm { entry_index: Option<u32> },
    Lvm { volume_index: Option<u32> },
    Vshadow { store_index: Option<u32> },
    ApfsContainer { volume_index: Option<u32> },
    CoreStorage { volume_index: Option<u32> },
    Bde { password: Option<String> },
    Luks { password: Option<String> },
    FileVault { password: Option<String> },
    Ntfs { location: Option<String>, mft_entry: Option<u64> },
    Ext { location: Option<String>, inode: Option<u64> },
    Fat { location: Option<String> },
    Hfs { location: Option<String>, identifier: Option<u64> },
    Apfs { location: Option<String>, identifier: Option<u64> },
    Iso { location: Option<String> },
    Range { range_offset: u64, range_size: u64 },
}

impl SpecKind {
    /// Type tag of this layer
    pub fn tag(&self) -> TypeTag {
        match self {
            SpecKind::Os { .. } => TypeTag::Os,
            SpecKind::Raw => TypeTag::Raw,
            SpecKind::Ewf => TypeTag::Ewf,
            SpecKind::Qcow => TypeTag::Qcow,
            SpecKind::Vhd => TypeTag::Vhd,
            SpecKind::Vhdx => TypeTag::Vhdx,
            SpecKind::Vmdk => TypeTag::Vmdk,
            SpecKind::Vdi => TypeTag::Vdi,
            SpecKind::Partition { .. } => TypeTag::Partition,
            SpecKind::Gpt { .. } => TypeTag::Gpt,
            SpecKind::Apm { .. } => TypeTag::Apm,
            SpecKind::Lvm { .. } => TypeTag::Lvm,
            SpecKind::Vshadow { .. } => TypeTag::Vshadow,
            SpecKind::ApfsContainer { .. } => TypeTag::ApfsContainer,
            SpecKind::CoreStorage { .. } => TypeTag::CoreStorage,
            SpecKind::Bde { .. } => TypeTag::Bde,
            SpecKind::Luks { .. } => TypeTag::Luks,
            SpecKind::FileVault { .. } => TypeTag::FileVault,
            SpecKind::Ntfs { .. } => TypeTag::Ntfs,
            SpecKind::Ext { .. } => TypeTag::Ext,
            SpecKind::Fat { .. } => TypeTag::Fat,
            SpecKind::Hfs { .. } => TypeTag::Hfs,
            SpecKind::Apfs { .. } => TypeTag::Apfs,
            SpecKind::Iso { .. } => TypeTag::Iso,
            SpecKind::Range { .. } => TypeTag::Range,
        }
    }

    /// Attribute-free layer of the given tag, used when a signature match
    /// identifies the type but nothing more is known yet.
    ///
    /// Returns None for tags whose required fields cannot be defaulted
    /// (`Os` needs a location, `Range` needs offset and size).
    pub fn default_for(tag: TypeTag) -> Option<SpecKind> {
        match tag {
            TypeTag::Os | TypeTag::Range => None,
            TypeTag::Raw => Some(SpecKind::Raw),
            TypeTag::Ewf => Some(SpecKind::Ewf),
            TypeTag::Qcow => Some(SpecKind::Qcow),
            TypeTag::Vhd => Some(SpecKind::Vhd),
            TypeTag::Vhdx => Some(SpecKind::Vhdx),
            TypeTag::Vmdk => Some(SpecKind::Vmdk),
            TypeTag::Vdi => Some(SpecKind::Vdi),
            TypeTag::Partition => Some(SpecKind::Partition { location: None, entry_index: None }),
            TypeTag::Gpt => Some(SpecKind::Gpt { entry_index: None }),
            TypeTag::Apm => Some(SpecKind::Apm { entry_index: None }),
            TypeTag::Lvm => Some(SpecKind::Lvm { volume_index: None }),
            TypeTag::Vshadow => Some(SpecKind::Vshadow { store_index: None }),
            TypeTag::ApfsContainer => Some(SpecKind::ApfsContainer { volume_index: None }),
            TypeTag::CoreStorage => Some(SpecKind::CoreStorage { volume_index: None }),
            TypeTag::Bde => Some(SpecKind::Bde { password: None }),
            TypeTag::Luks => Some(SpecKind::Luks { password: None }),
            TypeTag::FileVault => Some(SpecKind::FileVault { password: None }),
            TypeTag::Ntfs => Some(SpecKind::Ntfs { location: None, mft_entry: None }),
            TypeTag::Ext => Some(SpecKind::Ext { location: None, inode: None }),
            TypeTag::Fat => Some(SpecKind::Fat { location: None }),
            TypeTag::Hfs => Some(SpecKind::Hfs { location: None, identifier: None }),
            TypeTag::Apfs => Some(SpecKind::Apfs { location: None, identifier: None }),
            TypeTag::Iso => Some(SpecKind::Iso { location: None }),
        }
    }

    /// Render one layer for the comparable string: `type: TAG[, attr: value]*`
    ///
    /// Attributes appear in a fixed per-variant order. Absent optional
    /// fields are omitted entirely.
    pub fn describe(&self) -> String {
        let mut out = format!("type: {}", self.tag());
        for (name, value) in self.attributes() {
            out.push_str(&format!(", {}: {}", name, value));
        }
        out
    }

    /// Recognized, present attributes as name/value pairs, in the order
    /// they render into the comparable string.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        match self {
            SpecKind::Os { location } => {
                attrs.push(("location", location.clone()));
            }
            SpecKind::Partition { location, entry_index } => {
                push_opt_u32(&mut attrs, "entry_index", entry_index);
                push_opt_str(&mut attrs, "location", location);
            }
            SpecKind::Gpt { entry_index } | SpecKind::Apm { entry_index } => {
                push_opt_u32(&mut attrs, "entry_index", entry_index);
            }
            SpecKind::Lvm { volume_index }
            | SpecKind::ApfsContainer { volume_index }
            | SpecKind::CoreStorage { volume_index } => {
                push_opt_u32(&mut attrs, "volume_index", volume_index);
            }
            SpecKind::Vshadow { store_index } => {
                push_opt_u32(&mut attrs, "store_index", store_index);
            }
            SpecKind::Bde { password }
            | SpecKind::Luks { password }
            | SpecKind::FileVault { password } => {
                push_opt_str(&mut attrs, "password", password);
            }
            SpecKind::Ntfs { location, mft_entry } => {
                push_opt_str(&mut attrs, "location", location);
                push_opt_u64(&mut attrs, "mft_entry", mft_entry);
            }
            SpecKind::Ext { location, inode } => {
                push_opt_u64(&mut attrs, "inode", inode);
                push_opt_str(&mut attrs, "location", location);
            }
            SpecKind::Fat { location } | SpecKind::Iso { location } => {
                push_opt_str(&mut attrs, "location", location);
            }
            SpecKind::Hfs { location, identifier }
            | SpecKind::Apfs { location, identifier } => {
                push_opt_u64(&mut attrs, "identifier", identifier);
                push_opt_str(&mut attrs, "location", location);
            }
            SpecKind::Range { range_offset, range_size } => {
                attrs.push(("range_offset", range_offset.to_string()));
                attrs.push(("range_size", range_size.to_string()));
            }
            SpecKind::Raw
            | SpecKind::Ewf
            | SpecKind::Qcow
            | SpecKind::Vhd
            | SpecKind::Vhdx
            | SpecKind::Vmdk
            | SpecKind::Vdi => {}
        }
        attrs
    }
}

fn push_opt_str(attrs: &mut Vec<(&'static str, String)>, name: &'static str, value: &Option<String>) {
    if let Some(v) = value {
        attrs.push((name, v.clone()));
    }
}

fn push_opt_u32(attrs: &mut Vec<(&'static str, String)>, name: &'static str, value: &Option<u32>) {
    if let Some(v) = value {
        attrs.push((name, v.to_string()));
    }
}

fn push_opt_u64(attrs: &mut Vec<(&'static str, String)>, name: &'static str, value: &Option<u64>) {
    if let Some(v) = value {
        attrs.push((name, v.to_string()));
    }
}
