//! Raw image backend: single files and multi-segment sets
//!
//! A raw layer presents its parent OS file (or its globbed segment set)
//! as one contiguous byte stream. There is no format decoding; segment
//! spanning is the only work done here.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{CapabilityProvider, FormatBackend, OpenResult};
use crate::error::{VfsError, VfsResult};
use crate::resolver::ResolverContext;
use crate::segments;
use crate::spec::{PathSpec, SpecKind, TypeTag};

/// Backend for `Raw` path specs
pub struct RawBackend;

impl FormatBackend for RawBackend {
    fn open(&self, spec: &Arc<PathSpec>, _ctx: &ResolverContext) -> VfsResult<OpenResult> {
        if spec.type_tag() != TypeTag::Raw {
            return Err(VfsError::InvalidSpec(
                "raw backend requires a RAW path spec".to_string(),
            ));
        }
        let location = match spec.parent().map(|p| p.kind()) {
            Some(SpecKind::Os { location }) => location.clone(),
            _ => {
                return Err(VfsError::InvalidSpec(
                    "RAW layers require an OS parent".to_string(),
                ))
            }
        };

        let path = PathBuf::from(&location);
        let paths = segments::glob_raw_segments(&path).unwrap_or_else(|| vec![path]);

        let mut sizes = Vec::with_capacity(paths.len());
        for segment in &paths {
            let size = fs::metadata(segment)
                .map_err(|e| {
                    VfsError::BackEnd(format!("Failed to stat segment {:?}: {}", segment, e))
                })?
                .len();
            sizes.push(size);
        }
        let total_size = sizes.iter().sum();

        debug!(location, segment_count = paths.len(), total_size, "Opened raw image");
        Ok(OpenResult::Opened(Rc::new(RawProvider {
            segments: paths,
            sizes,
            total_size,
            open_segment: RefCell::new(None),
        })))
    }
}

// =============================================================================
// Raw provider
// =============================================================================

struct RawProvider {
    segments: Vec<PathBuf>,
    sizes: Vec<u64>,
    total_size: u64,
    /// Most recently used segment file, kept open across reads
    open_segment: RefCell<Option<(usize, File)>>,
}

impl RawProvider {
    /// Convert an absolute position to (segment index, offset within segment)
    fn locate(&self, pos: u64) -> Option<(usize, u64)> {
        let mut offset = pos;
        for (idx, &size) in self.sizes.iter().enumerate() {
            if offset < size {
                return Some((idx, offset));
            }
            offset -= size;
        }
        None
    }

    fn read_segment(&self, seg_idx: usize, seg_offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let mut open = self.open_segment.borrow_mut();
        let reopen = match open.as_ref() {
            Some((idx, _)) => *idx != seg_idx,
            None => true,
        };
        if reopen {
            let file = File::open(&self.segments[seg_idx]).map_err(|e| {
                VfsError::BackEnd(format!("Failed to open segment {}: {}", seg_idx, e))
            })?;
            *open = Some((seg_idx, file));
        }
        let (_, file) = open.as_mut().expect("segment file just opened");
        file.seek(SeekFrom::Start(seg_offset))?;
        Ok(file.read(buf)?)
    }
}

impl CapabilityProvider for RawProvider {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        if offset >= self.total_size {
            return Ok(0);
        }

        let mut total_read = 0;
        let mut position = offset;

        while total_read < buf.len() && position < self.total_size {
            let (seg_idx, seg_offset) = match self.locate(position) {
                Some(found) => found,
                None => break,
            };

            let seg_remaining = (self.sizes[seg_idx] - seg_offset) as usize;
            let to_read = (buf.len() - total_read).min(seg_remaining);
            let read = self.read_segment(
                seg_idx,
                seg_offset,
                &mut buf[total_read..total_read + to_read],
            )?;
            if read == 0 {
                break;
            }
            total_read += read;
            position += read as u64;
        }

        Ok(total_read)
    }

    fn size(&self) -> u64 {
        self.total_size
    }
}
