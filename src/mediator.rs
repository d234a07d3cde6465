//! Scan orchestration over suspension points
//!
//! The scanner itself never blocks on interactive input; it returns
//! `Locked` or `SelectionRequired` and stops. `drive_scan` closes that
//! loop: it forwards each suspension to a mediator, applies the answer
//! (credential or volume selection), and resumes until the scan either
//! completes or the mediator declines to answer.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::VfsResult;
use crate::scan::{ScanContext, ScanOutcome, SourceScanner};
use crate::spec::PathSpec;

/// Answer to "which of these volumes should be scanned?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSelection {
    /// Scan every candidate
    All,
    /// Scan the candidates at these positions, in candidate order
    Indices(Vec<usize>),
    /// Leave the container suspended
    None,
}

/// Supplier of credentials and volume selections for suspended scans.
///
/// Implementations that want to abort outright return
/// `Err(VfsError::UserAbort)`, which propagates without further
/// scanning.
pub trait ScanMediator {
    /// Pick which candidate volumes to descend into
    fn choose_volumes(&mut self, candidates: &[Arc<PathSpec>]) -> VfsResult<VolumeSelection>;

    /// Supply a credential for a locked layer, or None to leave it locked.
    /// `supported` lists the credential names the layer type accepts.
    fn supply_credential(
        &mut self,
        path_spec: &Arc<PathSpec>,
        supported: &[&'static str],
    ) -> VfsResult<Option<(String, Vec<u8>)>>;
}

/// Run a scan to its end, resolving suspensions through `mediator`.
///
/// Returns `Completed` when every frontier is terminal, or the last
/// suspension when the mediator declined to resolve it. The scan context
/// stays valid either way.
pub fn drive_scan(
    scanner: &SourceScanner,
    sc: &mut ScanContext,
    mediator: &mut dyn ScanMediator,
) -> VfsResult<ScanOutcome> {
    let mut resume_at: Option<Arc<PathSpec>> = None;

    loop {
        match scanner.scan(sc, resume_at.take().as_ref())? {
            ScanOutcome::Completed => return Ok(ScanOutcome::Completed),

            ScanOutcome::Locked { node, path_spec } => {
                let supported = path_spec.type_tag().supported_credentials();
                match mediator.supply_credential(&path_spec, supported)? {
                    Some((name, value)) => {
                        debug!(credential = %name, "Mediator supplied credential");
                        scanner.resolver().set_credential(&path_spec, &name, value)?;
                        resume_at = Some(path_spec);
                    }
                    None => {
                        info!("Mediator left layer locked");
                        return Ok(ScanOutcome::Locked { node, path_spec });
                    }
                }
            }

            ScanOutcome::SelectionRequired { node, candidates } => {
                let selection = mediator.choose_volumes(&candidates)?;
                let chosen: Vec<&Arc<PathSpec>> = match &selection {
                    VolumeSelection::All => candidates.iter().collect(),
                    VolumeSelection::Indices(indices) => candidates
                        .iter()
                        .enumerate()
                        .filter(|(idx, _)| indices.contains(idx))
                        .map(|(_, spec)| spec)
                        .collect(),
                    VolumeSelection::None => Vec::new(),
                };
                if chosen.is_empty() {
                    info!("Mediator made no volume selection");
                    return Ok(ScanOutcome::SelectionRequired { node, candidates });
                }
                debug!(count = chosen.len(), "Mediator selected volumes");
                for spec in chosen {
                    sc.add_scan_node(Arc::clone(spec), Some(node));
                }
                resume_at = sc.node(node).map(|n| Arc::clone(n.path_spec()));
            }
        }
    }
}
