//! End-to-end scanning scenarios over synthetic sources
//!
//! Real backends handle the OS and raw layers; partition and BitLocker
//! layers use in-memory test doubles so the fixtures stay small. The
//! signature analyzer is the real one throughout.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use layerscan::backend::{CapabilityProvider, FormatBackend, OpenResult, OsBackend, RawBackend};
use layerscan::error::{VfsError, VfsResult};
use layerscan::mediator::{drive_scan, ScanMediator, VolumeSelection};
use layerscan::resolver::ResolverContext;
use layerscan::scan::{ScanContext, ScanOutcome, SourceScanner, SourceType};
use layerscan::spec::{AttrValue, AttributeBag, PathSpec, SpecKind, TypeTag};
use layerscan::volume::{Volume, VolumeSystem};
use layerscan::{FormatRegistry, SignatureAnalyzer};

// =============================================================================
// Test doubles
// =============================================================================

/// Positionless byte source over owned memory
struct MemProvider {
    data: Vec<u8>,
}

impl CapabilityProvider for MemProvider {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let available = &self.data[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Bytes of a volume with an ext superblock magic in place
fn ext_volume_bytes() -> Vec<u8> {
    let mut data = vec![0u8; 4096];
    data[1080] = 0x53;
    data[1081] = 0xEF;
    data
}

/// Partition backend serving fixed per-volume byte images
struct FakePartitionBackend {
    volumes: Vec<Vec<u8>>,
}

struct FakeVolumeSystem {
    volumes: Vec<Volume>,
}

impl VolumeSystem for FakeVolumeSystem {
    fn volumes(&self) -> &[Volume] {
        &self.volumes
    }
}

impl FormatBackend for FakePartitionBackend {
    fn open(&self, spec: &Arc<PathSpec>, _ctx: &ResolverContext) -> VfsResult<OpenResult> {
        match spec.kind() {
            SpecKind::Partition { entry_index: Some(idx), .. } => {
                let data = self
                    .volumes
                    .get(*idx as usize)
                    .cloned()
                    .ok_or_else(|| VfsError::BackEnd(format!("no partition {}", idx)))?;
                Ok(OpenResult::Opened(Rc::new(MemProvider { data })))
            }
            _ => Err(VfsError::BackEnd("partition entry index required".to_string())),
        }
    }

    fn open_volume_system(
        &self,
        _spec: &Arc<PathSpec>,
        _ctx: &ResolverContext,
    ) -> VfsResult<Box<dyn VolumeSystem>> {
        let volumes = (0..self.volumes.len())
            .map(|idx| Volume::new(idx as u32, format!("p{}", idx + 1)))
            .collect();
        Ok(Box::new(FakeVolumeSystem { volumes }))
    }
}

/// Snapshot backend serving one ext volume per addressed store
struct FakeVssBackend {
    stores: usize,
}

impl FormatBackend for FakeVssBackend {
    fn open(&self, spec: &Arc<PathSpec>, _ctx: &ResolverContext) -> VfsResult<OpenResult> {
        match spec.kind() {
            SpecKind::Vshadow { store_index: Some(idx) } if (*idx as usize) < self.stores => {
                Ok(OpenResult::Opened(Rc::new(MemProvider { data: ext_volume_bytes() })))
            }
            _ => Err(VfsError::BackEnd("store index required".to_string())),
        }
    }

    fn open_volume_system(
        &self,
        _spec: &Arc<PathSpec>,
        _ctx: &ResolverContext,
    ) -> VfsResult<Box<dyn VolumeSystem>> {
        // Oldest store first, as the catalog lists them
        let volumes = (0..self.stores)
            .map(|idx| Volume::new(idx as u32, format!("vss{}", idx + 1)))
            .collect();
        Ok(Box::new(FakeVolumeSystem { volumes }))
    }
}

/// BitLocker backend that unlocks for one specific password
struct FakeBdeBackend;

impl FormatBackend for FakeBdeBackend {
    fn open(&self, spec: &Arc<PathSpec>, ctx: &ResolverContext) -> VfsResult<OpenResult> {
        match ctx.credential(spec, "password") {
            Some(password) if password == b"opensesame" => {
                Ok(OpenResult::Opened(Rc::new(MemProvider { data: ext_volume_bytes() })))
            }
            _ => Ok(OpenResult::Locked),
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) {
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

/// A plain image file carrying only the MBR boot marker
fn mbr_image(path: &Path) {
    let mut f = File::create(path).unwrap();
    write_at(&mut f, 510, &[0x55, 0xAA]);
    f.set_len(4096).unwrap();
}

/// A plain image file carrying the BitLocker volume header magic
fn bde_image(path: &Path) {
    let mut f = File::create(path).unwrap();
    write_at(&mut f, 3, b"-FVE-FS-");
    f.set_len(4096).unwrap();
}

/// A volume image with a live ext file system and a VSS catalog
fn vss_volume_image(path: &Path) {
    let mut f = File::create(path).unwrap();
    write_at(&mut f, 1080, &[0x53, 0xEF]);
    // VSS catalog identifier GUID at its fixed volume offset
    write_at(
        &mut f,
        7680,
        &[
            0x6B, 0x87, 0x08, 0x38, 0x76, 0xC1, 0x48, 0x4E, 0xB7, 0xAE, 0x04, 0x04, 0x6E, 0x6C,
            0xC7, 0x52,
        ],
    );
    f.set_len(8192).unwrap();
}

/// An image that carries two contradictory format signatures
fn ambiguous_image(path: &Path) {
    let mut f = File::create(path).unwrap();
    write_at(&mut f, 0, &[0x51, 0x46, 0x49, 0xFB]);
    f.set_len(4096).unwrap();
    write_at(&mut f, 4096 - 512, b"conectix");
}

fn scanner_with(volumes: Vec<Vec<u8>>) -> SourceScanner {
    let mut registry = FormatRegistry::new();
    registry.register(TypeTag::Os, Arc::new(OsBackend)).unwrap();
    registry.register(TypeTag::Raw, Arc::new(RawBackend)).unwrap();
    registry
        .register(TypeTag::Partition, Arc::new(FakePartitionBackend { volumes }))
        .unwrap();
    registry.register(TypeTag::Bde, Arc::new(FakeBdeBackend)).unwrap();
    let resolver = ResolverContext::new(Arc::new(registry));
    SourceScanner::new(Box::new(SignatureAnalyzer), resolver)
}

fn vss_scanner(stores: usize) -> SourceScanner {
    let mut registry = FormatRegistry::new();
    registry.register(TypeTag::Os, Arc::new(OsBackend)).unwrap();
    registry
        .register(TypeTag::Vshadow, Arc::new(FakeVssBackend { stores }))
        .unwrap();
    let resolver = ResolverContext::new(Arc::new(registry));
    SourceScanner::new(Box::new(SignatureAnalyzer), resolver)
}

fn tags_of(sc: &ScanContext) -> Vec<String> {
    sc.comparables()
        .iter()
        .map(|c| c.lines().last().unwrap().to_string())
        .collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn single_partition_image_scans_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.dd");
    mbr_image(&path);

    let scanner = scanner_with(vec![ext_volume_bytes()]);
    let mut sc = ScanContext::new();
    let root = sc.open_source_path(&path);

    let outcome = scanner.scan(&mut sc, None).unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed));
    assert_eq!(sc.source_type(), Some(SourceType::StorageMediaImage));

    // OS -> partition table -> p1 -> ext
    assert_eq!(sc.len(), 4);
    let table = sc.node(root).unwrap().children()[0];
    assert_eq!(sc.node(table).unwrap().path_spec().type_tag(), TypeTag::Partition);
    let p1 = sc.node(table).unwrap().children()[0];
    assert!(sc.node(p1).unwrap().path_spec().comparable().ends_with("location: /p1"));
    let fs = sc.node(p1).unwrap().children()[0];
    assert_eq!(sc.node(fs).unwrap().path_spec().type_tag(), TypeTag::Ext);
}

#[test]
fn locked_bde_suspends_then_resumes_with_credential() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.dd");
    bde_image(&path);

    let scanner = scanner_with(vec![]);
    let mut sc = ScanContext::new();
    sc.open_source_path(&path);

    let bde_spec = match scanner.scan(&mut sc, None).unwrap() {
        ScanOutcome::Locked { path_spec, .. } => {
            assert_eq!(path_spec.type_tag(), TypeTag::Bde);
            path_spec
        }
        other => panic!("expected Locked, got {:?}", other),
    };
    assert_eq!(sc.len(), 2);
    assert!(sc.source_type().is_none(), "no classification while suspended");

    scanner
        .resolver()
        .set_credential(&bde_spec, "password", b"opensesame".to_vec())
        .unwrap();
    let outcome = scanner.scan(&mut sc, Some(&bde_spec)).unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed));

    assert_eq!(sc.len(), 3);
    assert_eq!(sc.source_type(), Some(SourceType::StorageMediaImage));
    let tags = tags_of(&sc);
    assert!(tags[2].starts_with("type: EXT"));
}

#[test]
fn wrong_credential_stays_locked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.dd");
    bde_image(&path);

    let scanner = scanner_with(vec![]);
    let mut sc = ScanContext::new();
    sc.open_source_path(&path);

    let bde_spec = match scanner.scan(&mut sc, None).unwrap() {
        ScanOutcome::Locked { path_spec, .. } => path_spec,
        other => panic!("expected Locked, got {:?}", other),
    };

    scanner
        .resolver()
        .set_credential(&bde_spec, "password", b"letmein".to_vec())
        .unwrap();
    let outcome = scanner.scan(&mut sc, Some(&bde_spec)).unwrap();
    assert!(matches!(outcome, ScanOutcome::Locked { .. }));
    assert_eq!(sc.len(), 2, "tree unchanged while locked");
}

#[test]
fn multi_volume_container_requires_selection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.dd");
    mbr_image(&path);

    let scanner = scanner_with(vec![ext_volume_bytes(), vec![0u8; 4096]]);
    let mut sc = ScanContext::new();
    sc.open_source_path(&path);

    let (container, candidates) = match scanner.scan(&mut sc, None).unwrap() {
        ScanOutcome::SelectionRequired { node, candidates } => (node, candidates),
        other => panic!("expected SelectionRequired, got {:?}", other),
    };
    assert_eq!(candidates.len(), 2);
    assert!(candidates[0].comparable().ends_with("location: /p1"));
    assert!(candidates[1].comparable().ends_with("location: /p2"));
    let nodes_before = sc.len();

    // Select only the first partition and resume from the container
    let selected = sc.add_scan_node(Arc::clone(&candidates[0]), Some(container));
    let container_spec = Arc::clone(sc.node(container).unwrap().path_spec());
    let outcome = scanner.scan(&mut sc, Some(&container_spec)).unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed));

    // Exactly the selected subtree was added, nothing recreated
    assert_eq!(sc.len(), nodes_before + 2);
    assert_eq!(sc.node(container).unwrap().children(), &[selected]);
    let fs = sc.node(selected).unwrap().children()[0];
    assert_eq!(sc.node(fs).unwrap().path_spec().type_tag(), TypeTag::Ext);
    assert!(sc.node_by_spec(&candidates[1]).is_none());
}

struct SelectSecond;

impl ScanMediator for SelectSecond {
    fn choose_volumes(&mut self, _candidates: &[Arc<PathSpec>]) -> VfsResult<VolumeSelection> {
        Ok(VolumeSelection::Indices(vec![1]))
    }

    fn supply_credential(
        &mut self,
        _path_spec: &Arc<PathSpec>,
        _supported: &[&'static str],
    ) -> VfsResult<Option<(String, Vec<u8>)>> {
        Ok(None)
    }
}

#[test]
fn mediator_drives_selection_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.dd");
    mbr_image(&path);

    let scanner = scanner_with(vec![vec![0u8; 4096], ext_volume_bytes()]);
    let mut sc = ScanContext::new();
    sc.open_source_path(&path);

    let outcome = drive_scan(&scanner, &mut sc, &mut SelectSecond).unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed));

    // OS -> table -> p2 -> ext
    assert_eq!(sc.len(), 4);
    let tags = tags_of(&sc);
    assert!(tags[2].ends_with("location: /p2"));
    assert!(tags[3].starts_with("type: EXT"));
}

struct SelectAll;

impl ScanMediator for SelectAll {
    fn choose_volumes(&mut self, _candidates: &[Arc<PathSpec>]) -> VfsResult<VolumeSelection> {
        Ok(VolumeSelection::All)
    }

    fn supply_credential(
        &mut self,
        _path_spec: &Arc<PathSpec>,
        _supported: &[&'static str],
    ) -> VfsResult<Option<(String, Vec<u8>)>> {
        Ok(None)
    }
}

#[test]
fn repeated_scans_produce_identical_trees() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.dd");
    mbr_image(&path);
    let volumes = vec![ext_volume_bytes(), ext_volume_bytes()];

    let run = || {
        let scanner = scanner_with(volumes.clone());
        let mut sc = ScanContext::new();
        sc.open_source_path(&path);
        drive_scan(&scanner, &mut sc, &mut SelectAll).unwrap();
        sc
    };

    let first = run();
    let second = run();
    assert_eq!(first.comparables(), second.comparables());

    // Children keep candidate (on-disk) order even across selection
    let table = first.node(first.root_node().unwrap()).unwrap().children()[0];
    let children = first.node(table).unwrap().children();
    assert_eq!(children.len(), 2);
    let first_child = first.node(children[0]).unwrap().path_spec().comparable();
    let second_child = first.node(children[1]).unwrap().path_spec().comparable();
    assert!(first_child.ends_with("location: /p1"));
    assert!(second_child.ends_with("location: /p2"));
}

#[test]
fn standalone_probes_leave_no_state_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.dd");
    mbr_image(&path);

    let scanner = scanner_with(vec![ext_volume_bytes()]);
    let spec = PathSpec::os(path.to_string_lossy().to_string());

    let first = scanner.scan_for_volume_system(&spec).unwrap().unwrap();
    let second = scanner.scan_for_volume_system(&spec).unwrap().unwrap();
    assert_eq!(first.comparable(), second.comparable());
    assert_eq!(first.type_tag(), TypeTag::Partition);
    assert_eq!(scanner.resolver().live_provider_count(), 0);

    assert!(scanner.scan_for_storage_media_image(&spec).unwrap().is_none());
    assert!(scanner.scan_for_file_system(&spec).unwrap().is_none());
    assert_eq!(scanner.resolver().live_provider_count(), 0);
}

#[test]
fn equal_specs_share_one_cached_provider() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.dd");
    mbr_image(&path);
    let location = path.to_string_lossy().to_string();

    let scanner = scanner_with(vec![ext_volume_bytes()]);

    // Same identity built two different ways
    let direct = PathSpec::new(
        SpecKind::Partition { location: Some("/p1".to_string()), entry_index: Some(0) },
        Some(&PathSpec::os(location.clone())),
    )
    .unwrap();

    let mut attrs = AttributeBag::new();
    attrs.insert("location".to_string(), AttrValue::Str("/p1".to_string()));
    attrs.insert("entry_index".to_string(), AttrValue::U32(0));
    let rebuilt = PathSpec::from_attributes(
        TypeTag::Partition,
        &attrs,
        Some(&PathSpec::os(location)),
    )
    .unwrap();

    assert_eq!(direct.comparable(), rebuilt.comparable());

    let ctx = scanner.resolver();
    let h1 = ctx.open_file_object(&direct).unwrap();
    let h2 = ctx.open_file_object(&rebuilt).unwrap();
    assert!(Rc::ptr_eq(h1.provider(), h2.provider()));
    assert_eq!(ctx.reference_count(&direct), 2);
    drop(h1);
    drop(h2);
    assert_eq!(ctx.reference_count(&rebuilt), 0);
}

#[test]
fn snapshot_container_keeps_live_volume_and_scans_newest_store_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.img");
    vss_volume_image(&path);

    let scanner = vss_scanner(2);
    let mut sc = ScanContext::new();
    let root = sc.open_source_path(&path);

    let outcome = drive_scan(&scanner, &mut sc, &mut SelectAll).unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed));

    // The unsnapshotted file system stays a sibling of the container
    let root_children = sc.node(root).unwrap().children().to_vec();
    assert_eq!(root_children.len(), 2);
    let container = root_children[0];
    assert_eq!(sc.node(container).unwrap().path_spec().type_tag(), TypeTag::Vshadow);
    assert_eq!(sc.node(root_children[1]).unwrap().path_spec().type_tag(), TypeTag::Ext);

    // Stores keep catalog order in the tree...
    let stores = sc.node(container).unwrap().children().to_vec();
    assert_eq!(stores.len(), 2);
    let store_spec = |id| Arc::clone(sc.node(id).unwrap().path_spec());
    assert!(store_spec(stores[0]).comparable().ends_with("store_index: 0"));
    assert!(store_spec(stores[1]).comparable().ends_with("store_index: 1"));

    // ...but the newest store's contents resolve first, so its file
    // system occupies the earlier slot in discovery order
    let fs_of = |id| sc.node(id).unwrap().children()[0];
    assert!(fs_of(stores[1]).0 < fs_of(stores[0]).0);
    assert_eq!(sc.node(fs_of(stores[1])).unwrap().path_spec().type_tag(), TypeTag::Ext);
    assert_eq!(sc.node(fs_of(stores[0])).unwrap().path_spec().type_tag(), TypeTag::Ext);

    assert_eq!(sc.len(), 7);
    assert_eq!(sc.source_type(), Some(SourceType::StorageMediaImage));
}

#[test]
fn contradictory_signatures_fail_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weird.img");
    ambiguous_image(&path);

    let scanner = scanner_with(vec![]);
    let mut sc = ScanContext::new();
    sc.open_source_path(&path);

    let err = scanner.scan(&mut sc, None).unwrap_err();
    match err {
        VfsError::AmbiguousFormat(tags) => {
            assert!(tags.contains(&TypeTag::Qcow));
            assert!(tags.contains(&TypeTag::Vhd));
        }
        other => panic!("expected AmbiguousFormat, got {:?}", other),
    }
    // The source node stays intact; nothing speculative was added
    assert_eq!(sc.len(), 1);
}
