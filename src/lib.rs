//! layerscan: composable storage-layer discovery
//!
//! Locates and names the layers present in a storage source (plain file,
//! block device, or directory) so callers can address any embedded
//! object with one canonical path specification: a file inside an NTFS
//! volume inside a VSS snapshot inside a QCOW image, say, becomes a
//! single parent-linked spec chain.
//!
//! The pieces:
//! - [`spec`]: immutable, parent-linked path specifications with
//!   canonical-string identity
//! - [`registry`]: type tag to format backend mapping, built once at
//!   startup and shared read-only
//! - [`resolver`]: per-scan provider cache, at most one live provider
//!   per layer identity
//! - [`analyzer`]: byte-signature format detection
//! - [`scan`]: the recursive source scanner and its tree
//! - [`mediator`]: resumption of suspended scans (credentials, volume
//!   selection)
//!
//! Scanning never blocks on interactive input. A locked encrypted layer
//! or an unselected multi-volume container suspends the scan with a
//! typed outcome; the caller supplies the missing input and resumes.

pub mod analyzer;
pub mod backend;
pub mod error;
pub mod keychain;
pub mod logging;
pub mod mediator;
pub mod registry;
pub mod resolver;
pub mod scan;
pub mod segments;
pub mod spec;
pub mod volume;

pub use analyzer::{FormatAnalyzer, SignatureAnalyzer};
pub use error::{VfsError, VfsResult};
pub use keychain::KeyChain;
pub use mediator::{drive_scan, ScanMediator, VolumeSelection};
pub use registry::FormatRegistry;
pub use resolver::{OpenState, ProviderHandle, ResolverContext};
pub use scan::{ScanContext, ScanOutcome, ScanSummary, SourceScanner, SourceType};
pub use spec::{PathSpec, SpecKind, TypeTag};
