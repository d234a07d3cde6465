//! OS-level backend: plain files, directories, and block devices

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::backend::{CapabilityProvider, FormatBackend, OpenResult};
use crate::error::{VfsError, VfsResult};
use crate::resolver::ResolverContext;
use crate::spec::{PathSpec, SpecKind};

/// Backend for `Os` path specs
pub struct OsBackend;

impl FormatBackend for OsBackend {
    fn open(&self, spec: &Arc<PathSpec>, _ctx: &ResolverContext) -> VfsResult<OpenResult> {
        let location = match spec.kind() {
            SpecKind::Os { location } => location,
            _ => {
                return Err(VfsError::InvalidSpec(
                    "OS backend requires an OS path spec".to_string(),
                ))
            }
        };

        let metadata = fs::metadata(location)
            .map_err(|e| VfsError::BackEnd(format!("Failed to stat {}: {}", location, e)))?;

        if metadata.is_dir() {
            debug!(location, "Opened OS directory");
            return Ok(OpenResult::Opened(Rc::new(OsDirectoryProvider {
                path: PathBuf::from(location),
            })));
        }

        let mut file = File::open(location)
            .map_err(|e| VfsError::BackEnd(format!("Failed to open {}: {}", location, e)))?;

        // Block devices report zero metadata length; seek to the end for
        // the real size
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        debug!(location, size, "Opened OS file");
        Ok(OpenResult::Opened(Rc::new(OsFileProvider {
            file: RefCell::new(file),
            size,
        })))
    }
}

// =============================================================================
// File provider
// =============================================================================

struct OsFileProvider {
    file: RefCell<File>,
    size: u64,
}

impl CapabilityProvider for OsFileProvider {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;

        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        trace!(offset, bytes = total, "OS file read");
        Ok(total)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

// =============================================================================
// Directory provider
// =============================================================================

struct OsDirectoryProvider {
    path: PathBuf,
}

impl CapabilityProvider for OsDirectoryProvider {
    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::BackEnd("directory has no byte stream".to_string()))
    }

    fn size(&self) -> u64 {
        0
    }

    fn list_children(&self, _spec: &PathSpec) -> VfsResult<Vec<Arc<PathSpec>>> {
        let mut names: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            names.push(entry.path());
        }
        // Directory order is platform-dependent; sort for determinism
        names.sort();

        Ok(names
            .iter()
            .map(|p| PathSpec::os(path_to_string(p)))
            .collect())
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
