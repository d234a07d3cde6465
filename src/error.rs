//! Error types for layer discovery and resolution

use std::fmt;
use std::io;

use crate::spec::TypeTag;

/// Result type alias for layer discovery operations
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors that can occur while building path specifications, resolving
/// capability providers, or scanning a source.
///
/// `Locked` and `SelectionRequired` are deliberately absent: those are
/// suspension outcomes carried by `scan::ScanOutcome`, not failures.
#[derive(Debug)]
pub enum VfsError {
    /// Malformed path spec (missing parent, missing required field, bad attribute)
    InvalidSpec(String),
    /// A type tag was registered twice
    DuplicateType(TypeTag),
    /// A type tag was never registered
    UnknownType(TypeTag),
    /// More than one format signature matched the same bytes
    AmbiguousFormat(Vec<TypeTag>),
    /// Underlying capability provider failed to open or read
    BackEnd(String),
    /// I/O error (file read/seek/metadata)
    Io(io::Error),
    /// Credential name not supported by the target layer type
    UnsupportedCredential { tag: TypeTag, name: String },
    /// Explicit cancellation from an interactive mediator
    UserAbort,
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::InvalidSpec(msg) => write!(f, "Invalid path spec: {}", msg),
            VfsError::DuplicateType(tag) => write!(f, "Type already registered: {}", tag),
            VfsError::UnknownType(tag) => write!(f, "Type not registered: {}", tag),
            VfsError::AmbiguousFormat(tags) => {
                let names: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
                write!(f, "Ambiguous format, multiple signatures matched: {}", names.join(", "))
            }
            VfsError::BackEnd(msg) => write!(f, "Back-end error: {}", msg),
            VfsError::Io(e) => write!(f, "I/O error: {}", e),
            VfsError::UnsupportedCredential { tag, name } => {
                write!(f, "Credential '{}' not supported by {} layers", name, tag)
            }
            VfsError::UserAbort => write!(f, "Aborted by user"),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        VfsError::Io(err)
    }
}
