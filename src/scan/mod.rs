//! Recursive source scanning: tree, driver, and summaries

mod scanner;
mod summary;
mod tree;

pub use scanner::{ImageScanResult, ScanOutcome, SourceScanner};
pub use summary::{NodeSummary, ScanSummary};
pub use tree::{NodeId, ScanContext, ScanNode, SourceType};
