//! Resolver context: per-scan provider cache with reference counting
//!
//! A context guarantees at most one live provider instance per distinct
//! layer identity (canonical path-spec string). Opening a cached layer
//! increments its reference count and hands back a handle over the same
//! provider; dropping the last handle evicts the provider. Contexts are
//! deliberately single-threaded (`Rc`/`RefCell` internals); parallel
//! scans each get their own context while sharing the read-only registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, SeekFrom};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::backend::{CapabilityProvider, OpenResult};
use crate::error::{VfsError, VfsResult};
use crate::keychain::KeyChain;
use crate::registry::FormatRegistry;
use crate::spec::{PathSpec, TypeTag};

// =============================================================================
// Context
// =============================================================================

struct CacheEntry {
    provider: Rc<dyn CapabilityProvider>,
    refs: usize,
}

type ProviderCache = Rc<RefCell<HashMap<String, CacheEntry>>>;

/// Outcome of `ResolverContext::try_open`
pub enum OpenState {
    Open(ProviderHandle),
    /// Encrypted layer with no usable credential on record
    Locked,
}

/// Process-scoped cache of open capability providers
pub struct ResolverContext {
    registry: Arc<FormatRegistry>,
    cache: ProviderCache,
    key_chain: RefCell<KeyChain>,
}

impl ResolverContext {
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        ResolverContext {
            registry,
            cache: Rc::new(RefCell::new(HashMap::new())),
            key_chain: RefCell::new(KeyChain::new()),
        }
    }

    pub fn registry(&self) -> &Arc<FormatRegistry> {
        &self.registry
    }

    /// Open the layer, reporting `Locked` for an encrypted layer whose
    /// credential is missing or wrong. The scanner uses this form.
    pub fn try_open(&self, spec: &Arc<PathSpec>) -> VfsResult<OpenState> {
        let key = spec.comparable();

        // Cache hit: same provider, one more holder
        {
            let mut cache = self.cache.borrow_mut();
            if let Some(entry) = cache.get_mut(&key) {
                entry.refs += 1;
                trace!(key, refs = entry.refs, "Provider cache hit");
                return Ok(OpenState::Open(ProviderHandle::new(
                    key,
                    Rc::clone(&entry.provider),
                    Rc::clone(&self.cache),
                )));
            }
        }

        // First open for this identity. The backend may recursively open
        // the parent spec through this same context, so the cache borrow
        // above must already be released.
        let backend = Arc::clone(self.registry.backend(spec.type_tag())?);
        let provider = match backend.open(spec, self)? {
            OpenResult::Locked => {
                debug!(key, "Layer is locked");
                return Ok(OpenState::Locked);
            }
            OpenResult::Opened(provider) => provider,
        };

        debug!(key, "Opened provider");
        self.cache.borrow_mut().insert(
            key.clone(),
            CacheEntry { provider: Rc::clone(&provider), refs: 1 },
        );
        Ok(OpenState::Open(ProviderHandle::new(key, provider, Rc::clone(&self.cache))))
    }

    /// Open the layer as a byte stream.
    /// A locked encrypted layer is a back-end failure at this interface.
    pub fn open_file_object(&self, spec: &Arc<PathSpec>) -> VfsResult<ProviderHandle> {
        match self.try_open(spec)? {
            OpenState::Open(handle) => Ok(handle),
            OpenState::Locked => Err(VfsError::BackEnd(
                "encrypted layer is locked, credential required".to_string(),
            )),
        }
    }

    /// Open the layer as a file system (child enumeration).
    /// The tag must be file-system capable or an OS directory.
    pub fn open_file_system(&self, spec: &Arc<PathSpec>) -> VfsResult<ProviderHandle> {
        let tag = spec.type_tag();
        if !tag.is_file_system() && tag != TypeTag::Os {
            return Err(VfsError::InvalidSpec(format!(
                "{} layers do not expose a file system",
                tag
            )));
        }
        self.open_file_object(spec)
    }

    /// Number of live providers in this context
    pub fn live_provider_count(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Current reference count for a layer identity, 0 when not open
    pub fn reference_count(&self, spec: &Arc<PathSpec>) -> usize {
        self.cache
            .borrow()
            .get(&spec.comparable())
            .map(|entry| entry.refs)
            .unwrap_or(0)
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Store a credential for an encrypted layer in this context's key chain
    pub fn set_credential(&self, spec: &Arc<PathSpec>, name: &str, value: Vec<u8>) -> VfsResult<()> {
        self.key_chain.borrow_mut().set(spec, name, value)
    }

    /// Fetch a credential for an encrypted layer
    pub fn credential(&self, spec: &Arc<PathSpec>, name: &str) -> Option<Vec<u8>> {
        self.key_chain.borrow().get(spec, name).map(|v| v.to_vec())
    }
}

// =============================================================================
// Handle
// =============================================================================

/// A counted reference to a cached provider, with its own stream position.
///
/// Dropping the handle releases its hold; the provider is evicted when
/// the last handle goes away. Positions are per-handle, so callers must
/// not assume a position survives a close/reopen cycle.
pub struct ProviderHandle {
    key: String,
    provider: Rc<dyn CapabilityProvider>,
    cache: ProviderCache,
    position: u64,
}

impl ProviderHandle {
    fn new(key: String, provider: Rc<dyn CapabilityProvider>, cache: ProviderCache) -> Self {
        ProviderHandle { key, provider, cache, position: 0 }
    }

    /// Read from the current position, advancing it
    pub fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let read = self.provider.read_at(self.position, buf)?;
        self.position += read as u64;
        Ok(read)
    }

    /// Reposition the stream
    pub fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        let size = self.provider.size();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.position = offset;
                Ok(offset)
            }
            None => Err(VfsError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ))),
        }
    }

    /// Size of the underlying layer
    pub fn size(&self) -> u64 {
        self.provider.size()
    }

    /// Enumerate children of `spec` within this layer
    pub fn list_children(&self, spec: &PathSpec) -> VfsResult<Vec<Arc<PathSpec>>> {
        self.provider.list_children(spec)
    }

    /// The shared provider instance (identity comparisons in callers)
    pub fn provider(&self) -> &Rc<dyn CapabilityProvider> {
        &self.provider
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("key", &self.key)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl Drop for ProviderHandle {
    fn drop(&mut self) {
        let mut cache = self.cache.borrow_mut();
        if let Some(entry) = cache.get_mut(&self.key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                trace!(key = %self.key, "Evicting provider");
                cache.remove(&self.key);
            }
        }
    }
}
