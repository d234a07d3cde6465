//! Byte-signature analyzer
//!
//! Matches layer types by magic bytes read through an open provider
//! handle. Decoding a matched format stays entirely behind that format's
//! backend; this module only answers "which signatures are present".

use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::analyzer::FormatAnalyzer;
use crate::error::VfsResult;
use crate::resolver::{ProviderHandle, ResolverContext};
use crate::spec::{PathSpec, TypeTag};

// =============================================================================
// Magic Signatures Reference
// =============================================================================
// Format  | Magic Bytes              | Location
// --------|--------------------------|---------------------------
// EWF     | EVF\x09\x0d\x0a\xff\x00  | Offset 0
// QCOW    | QFI\xfb                  | Offset 0
// VHDX    | vhdxfile                 | Offset 0
// VMDK    | KDMV                     | Offset 0
// VDI     | <<< Oracle VM...         | Offset 0
// VHD     | conectix                 | EOF-512
// GPT     | EFI PART                 | Offset 512
// APM     | PM\x00\x00               | Offset 512
// LVM     | LABELONE                 | Offset 512
// BDE     | -FVE-FS-                 | Offset 3
// LUKS    | LUKS\xba\xbe             | Offset 0
// APFS    | NXSB (container)         | Offset 32
// CS      | CS                       | Offset 88
// VSS     | catalog GUID             | Offset 7680
// MBR     | \x55\xaa                 | Offset 510 (guarded, see below)
// NTFS    | NTFS\x20\x20\x20\x20     | Offset 3
// EXT     | \x53\xef                 | Offset 1080 (superblock + 56)
// FAT     | FAT/FAT32 + \x55\xaa     | Offsets 54/82 + 510
// HFS+    | H+ / HX                  | Offset 1024
// APFS    | APSB (volume)            | Offset 32
// ISO     | CD001                    | Offset 32769
// =============================================================================

pub const EWF_MAGIC: &[u8] = &[0x45, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];
pub const QCOW_MAGIC: &[u8] = &[0x51, 0x46, 0x49, 0xFB]; // QFI\xfb
pub const VHDX_MAGIC: &[u8] = b"vhdxfile";
pub const VMDK_MAGIC: &[u8] = &[0x4B, 0x44, 0x4D, 0x56]; // KDMV (sparse)
pub const VDI_MAGIC: &[u8] = b"<<< Oracle VM VirtualBox Disk Image >>>";
pub const VHD_MAGIC: &[u8] = b"conectix"; // At EOF-512

pub const GPT_MAGIC: &[u8] = b"EFI PART";
pub const APM_MAGIC: &[u8] = &[0x50, 0x4D, 0x00, 0x00]; // PM
pub const LVM_MAGIC: &[u8] = b"LABELONE";
pub const BDE_MAGIC: &[u8] = b"-FVE-FS-";
pub const LUKS_MAGIC: &[u8] = &[0x4C, 0x55, 0x4B, 0x53, 0xBA, 0xBE];
pub const APFS_CONTAINER_MAGIC: &[u8] = b"NXSB";
pub const CORE_STORAGE_MAGIC: &[u8] = b"CS";
// VSS catalog identifier GUID 3808876b-c176-4e48-b7ae-04046e6cc752
pub const VSHADOW_MAGIC: &[u8] = &[
    0x6B, 0x87, 0x08, 0x38, 0x76, 0xC1, 0x48, 0x4E, 0xB7, 0xAE, 0x04, 0x04, 0x6E, 0x6C, 0xC7,
    0x52,
];
pub const BOOT_SECTOR_MAGIC: &[u8] = &[0x55, 0xAA]; // MBR and FAT/NTFS VBRs

pub const NTFS_MAGIC: &[u8] = b"NTFS\x20\x20\x20\x20";
pub const EXT_MAGIC: &[u8] = &[0x53, 0xEF];
pub const FAT16_MAGIC: &[u8] = b"FAT"; // FAT12/16 at offset 54
pub const FAT32_MAGIC: &[u8] = b"FAT32"; // At offset 82
pub const HFS_PLUS_MAGIC: &[u8] = b"H+";
pub const HFSX_MAGIC: &[u8] = b"HX";
pub const APFS_VOLUME_MAGIC: &[u8] = b"APSB";
pub const ISO_MAGIC: &[u8] = b"CD001"; // At offset 32769 (0x8001)

/// Where a signature sits relative to the layer's byte stream
#[derive(Debug, Clone, Copy)]
enum SigOffset {
    Start(u64),
    FromEnd(u64),
}

struct Signature {
    tag: TypeTag,
    offset: SigOffset,
    bytes: &'static [u8],
}

const STORAGE_IMAGE_SIGNATURES: &[Signature] = &[
    Signature { tag: TypeTag::Ewf, offset: SigOffset::Start(0), bytes: EWF_MAGIC },
    Signature { tag: TypeTag::Qcow, offset: SigOffset::Start(0), bytes: QCOW_MAGIC },
    Signature { tag: TypeTag::Vhdx, offset: SigOffset::Start(0), bytes: VHDX_MAGIC },
    Signature { tag: TypeTag::Vmdk, offset: SigOffset::Start(0), bytes: VMDK_MAGIC },
    Signature { tag: TypeTag::Vdi, offset: SigOffset::Start(0), bytes: VDI_MAGIC },
    Signature { tag: TypeTag::Vhd, offset: SigOffset::FromEnd(512), bytes: VHD_MAGIC },
];

const VOLUME_SYSTEM_SIGNATURES: &[Signature] = &[
    Signature { tag: TypeTag::Gpt, offset: SigOffset::Start(512), bytes: GPT_MAGIC },
    Signature { tag: TypeTag::Apm, offset: SigOffset::Start(512), bytes: APM_MAGIC },
    Signature { tag: TypeTag::Lvm, offset: SigOffset::Start(512), bytes: LVM_MAGIC },
    Signature { tag: TypeTag::Bde, offset: SigOffset::Start(3), bytes: BDE_MAGIC },
    Signature { tag: TypeTag::Luks, offset: SigOffset::Start(0), bytes: LUKS_MAGIC },
    Signature { tag: TypeTag::ApfsContainer, offset: SigOffset::Start(32), bytes: APFS_CONTAINER_MAGIC },
    Signature { tag: TypeTag::CoreStorage, offset: SigOffset::Start(88), bytes: CORE_STORAGE_MAGIC },
    Signature { tag: TypeTag::Vshadow, offset: SigOffset::Start(7680), bytes: VSHADOW_MAGIC },
];

const FILE_SYSTEM_SIGNATURES: &[Signature] = &[
    Signature { tag: TypeTag::Ntfs, offset: SigOffset::Start(3), bytes: NTFS_MAGIC },
    Signature { tag: TypeTag::Ext, offset: SigOffset::Start(1080), bytes: EXT_MAGIC },
    Signature { tag: TypeTag::Hfs, offset: SigOffset::Start(1024), bytes: HFS_PLUS_MAGIC },
    Signature { tag: TypeTag::Hfs, offset: SigOffset::Start(1024), bytes: HFSX_MAGIC },
    Signature { tag: TypeTag::Apfs, offset: SigOffset::Start(32), bytes: APFS_VOLUME_MAGIC },
    Signature { tag: TypeTag::Iso, offset: SigOffset::Start(32769), bytes: ISO_MAGIC },
];

// =============================================================================
// Analyzer
// =============================================================================

/// Concrete analyzer probing magic bytes through the resolver
pub struct SignatureAnalyzer;

impl SignatureAnalyzer {
    fn match_table(
        &self,
        table: &[Signature],
        spec: &Arc<PathSpec>,
        ctx: &ResolverContext,
    ) -> VfsResult<BTreeSet<TypeTag>> {
        // The handle lives only for this probe; dropping it releases the
        // provider reference the probe took.
        let mut handle = ctx.open_file_object(spec)?;
        let mut matches = BTreeSet::new();
        for signature in table {
            if read_matches(&mut handle, signature.offset, signature.bytes)? {
                trace!(tag = %signature.tag, "Signature matched");
                matches.insert(signature.tag);
            }
        }
        Ok(matches)
    }
}

impl FormatAnalyzer for SignatureAnalyzer {
    fn match_storage_image(
        &self,
        spec: &Arc<PathSpec>,
        ctx: &ResolverContext,
    ) -> VfsResult<BTreeSet<TypeTag>> {
        let matches = self.match_table(STORAGE_IMAGE_SIGNATURES, spec, ctx)?;
        debug!(count = matches.len(), "Storage image signature scan");
        Ok(matches)
    }

    fn match_volume_system(
        &self,
        spec: &Arc<PathSpec>,
        ctx: &ResolverContext,
    ) -> VfsResult<BTreeSet<TypeTag>> {
        let mut matches = self.match_table(VOLUME_SYSTEM_SIGNATURES, spec, ctx)?;

        // MBR shares its 0x55AA marker with FAT, NTFS, and BDE boot
        // sectors; only report a partition table when nothing else
        // claims the same sector.
        let mut handle = ctx.open_file_object(spec)?;
        if read_matches(&mut handle, SigOffset::Start(510), BOOT_SECTOR_MAGIC)?
            && !read_matches(&mut handle, SigOffset::Start(3), NTFS_MAGIC)?
            && !read_matches(&mut handle, SigOffset::Start(3), BDE_MAGIC)?
            && !read_matches(&mut handle, SigOffset::Start(54), FAT16_MAGIC)?
            && !read_matches(&mut handle, SigOffset::Start(82), FAT32_MAGIC)?
        {
            matches.insert(TypeTag::Partition);
        }

        debug!(count = matches.len(), "Volume system signature scan");
        Ok(matches)
    }

    fn match_file_system(
        &self,
        spec: &Arc<PathSpec>,
        ctx: &ResolverContext,
    ) -> VfsResult<BTreeSet<TypeTag>> {
        let mut matches = self.match_table(FILE_SYSTEM_SIGNATURES, spec, ctx)?;

        // FAT needs the boot marker plus one of its OEM labels
        let mut handle = ctx.open_file_object(spec)?;
        if read_matches(&mut handle, SigOffset::Start(510), BOOT_SECTOR_MAGIC)?
            && (read_matches(&mut handle, SigOffset::Start(54), FAT16_MAGIC)?
                || read_matches(&mut handle, SigOffset::Start(82), FAT32_MAGIC)?)
        {
            matches.insert(TypeTag::Fat);
        }

        debug!(count = matches.len(), "File system signature scan");
        Ok(matches)
    }
}

/// Read `expected.len()` bytes at the signature offset and compare.
/// A region beyond the end of the stream never matches.
fn read_matches(
    handle: &mut ProviderHandle,
    offset: SigOffset,
    expected: &[u8],
) -> VfsResult<bool> {
    let size = handle.size();
    let start = match offset {
        SigOffset::Start(offset) => offset,
        SigOffset::FromEnd(delta) => match size.checked_sub(delta) {
            Some(start) => start,
            None => return Ok(false),
        },
    };
    if start + expected.len() as u64 > size {
        return Ok(false);
    }

    handle.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; expected.len()];
    let read = handle.read(&mut buf)?;
    Ok(read == expected.len() && buf == expected)
}
