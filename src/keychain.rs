//! Per-path-spec credential storage
//!
//! The key chain holds credentials for encrypted layers, keyed by the
//! layer's canonical identity. Nothing is persisted; each process (and
//! in practice each resolver context) carries its own chain.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::spec::PathSpec;

/// In-memory credential store keyed by canonical path-spec identity
#[derive(Default)]
pub struct KeyChain {
    credentials: HashMap<String, BTreeMap<String, Vec<u8>>>,
}

impl KeyChain {
    pub fn new() -> Self {
        KeyChain { credentials: HashMap::new() }
    }

    /// Store a credential for the given layer.
    ///
    /// Fails with `UnsupportedCredential` when the layer's type does not
    /// accept a credential of that name.
    pub fn set(&mut self, spec: &Arc<PathSpec>, name: &str, value: Vec<u8>) -> VfsResult<()> {
        let tag = spec.type_tag();
        if !tag.supported_credentials().contains(&name) {
            return Err(VfsError::UnsupportedCredential { tag, name: name.to_string() });
        }
        debug!(%tag, credential = name, "Stored credential");
        self.credentials
            .entry(spec.comparable())
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Fetch a credential for the given layer
    pub fn get(&self, spec: &Arc<PathSpec>, name: &str) -> Option<&[u8]> {
        self.credentials
            .get(&spec.comparable())
            .and_then(|creds| creds.get(name))
            .map(|v| v.as_slice())
    }

    /// Drop every credential for the given layer
    pub fn remove(&mut self, spec: &Arc<PathSpec>) {
        self.credentials.remove(&spec.comparable());
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}
