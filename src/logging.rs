//! Logging and tracing configuration for layerscan
//!
//! This module provides structured logging using the `tracing` crate.
//!
//! # Usage
//!
//! Initialize logging once at startup:
//! ```rust
//! layerscan::logging::init();
//! ```
//!
//! # Log Levels
//!
//! - `error` - Errors that prevent operation completion
//! - `warn`  - Unexpected situations that don't prevent completion
//! - `info`  - High-level operation progress (default in release)
//! - `debug` - Detailed operation information (default in debug builds)
//! - `trace` - Very verbose, step-by-step details
//!
//! # Environment Variable Control
//!
//! Set `RUST_LOG` to control log levels at runtime:
//! ```bash
//! RUST_LOG=debug ./tool                  # All debug logs
//! RUST_LOG=layerscan=trace ./tool        # Trace for this crate only
//! RUST_LOG=layerscan::scan=debug ./tool  # Per-module control
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging/tracing system
///
/// Call this once at application startup.
pub fn init() {
    // Build filter from environment or use defaults
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default: info in release, debug in debug builds
        if cfg!(debug_assertions) {
            EnvFilter::new("layerscan=debug")
        } else {
            EnvFilter::new("layerscan=info")
        }
    });

    // Configure the subscriber
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)      // Show module path
            .with_thread_ids(false) // Hide thread IDs (cleaner)
            .with_file(false)       // Hide file:line in normal mode
            .with_line_number(false)
            .compact(),             // Compact format
    );

    // Set as global default (ignore error if already set)
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Initialize logging with verbose output (file:line, thread IDs)
/// Useful for debugging during development
pub fn init_verbose() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .pretty(), // Pretty multi-line format
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level as LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        init();
        info!("Test log message");
        debug!(key = "value", "Structured log");
    }
}
