//! Multi-segment naming schemas for raw images
//!
//! Raw images carry no byte signature, so detection falls back to their
//! well-known segment naming schemas:
//! - Numbered suffixes: .000/.001, .002, ...
//! - Alphabetical suffixes: .aa, .ab, ...
//! - VMware split images: -f001.vmdk, -f002.vmdk, ...
//! - Counted sets: .1of5, .2of5, ...
//! - Plain trailing digits: disk0, disk1, ...
//!
//! A schema match alone is only a guess; the glob confirms that at least
//! the first segment of the derived set actually exists on disk. Both
//! steps work on the filename as given: candidate names are spliced into
//! the original name so on-disk casing survives.

use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

lazy_static! {
    static ref NUMBERED: Regex = Regex::new(r"^(?P<base>.+)\.(?P<num>\d{3})$").unwrap();
    static ref ALPHABETICAL: Regex = Regex::new(r"(?i)^(?P<base>.+)\.(?P<seq>[a-z]{2})$").unwrap();
    static ref VMDK_SPLIT: Regex = Regex::new(r"(?i)^(?P<base>.+)-f(?P<num>\d{3})\.vmdk$").unwrap();
    static ref X_OF_N: Regex =
        Regex::new(r"(?i)^(?P<base>.+)\.(?P<num>\d+)of(?P<total>\d+)$").unwrap();
    static ref TRAILING_DIGIT: Regex = Regex::new(r"^(?P<base>.+?[^\d])(?P<num>\d{1,2})$").unwrap();
    // Dotted alpha tail: digits after ".e", ".vmdk", ... belong to an
    // extension (.e01, .s02), not a trailing-digit segment set
    static ref EXTENSION_TAIL: Regex = Regex::new(r"(?i)\.[a-z]+$").unwrap();
}

// =============================================================================
// Schema checks
// =============================================================================

/// Check if a filename matches any known multi-segment naming schema
pub fn matches_segment_schema(filename: &str) -> bool {
    NUMBERED.is_match(filename)
        || ALPHABETICAL.is_match(filename)
        || VMDK_SPLIT.is_match(filename)
        || X_OF_N.is_match(filename)
        || trailing_digit_captures(filename).is_some()
}

/// Trailing-digit schema match, unless the digits sit in a dotted alpha
/// extension such as `.e01`
fn trailing_digit_captures(filename: &str) -> Option<regex::Captures<'_>> {
    let caps = TRAILING_DIGIT.captures(filename)?;
    if EXTENSION_TAIL.is_match(caps.name("base")?.as_str()) {
        return None;
    }
    Some(caps)
}

// =============================================================================
// Glob
// =============================================================================

/// Derive the full segment set for `path` from its naming schema.
///
/// Returns the consecutive existing segments, first to last, or None when
/// no schema matches or the first segment of the derived set is missing.
pub fn glob_raw_segments(path: &Path) -> Option<Vec<PathBuf>> {
    let filename = path.file_name()?.to_string_lossy().to_string();
    let dir = path.parent().unwrap_or(Path::new("."));
    trace!(?path, "Globbing raw segments");

    if let Some(caps) = NUMBERED.captures(&filename) {
        let span = caps.name("num")?.range();
        // Sets start at .000 or .001 depending on the imaging tool
        for start in [0u32, 1u32] {
            let segments =
                collect(dir, start, |n| splice(&filename, &span, &format!("{:03}", n)));
            if !segments.is_empty() {
                debug!(count = segments.len(), "Globbed numbered segments");
                return Some(segments);
            }
        }
    }

    if let Some(caps) = ALPHABETICAL.captures(&filename) {
        let seq = caps.name("seq")?;
        let uppercase = seq.as_str().chars().all(|c| c.is_ascii_uppercase());
        let span = seq.range();
        let segments = collect(dir, 0, |n| {
            let suffix = alpha_suffix(n);
            let suffix = if uppercase { suffix.to_ascii_uppercase() } else { suffix };
            splice(&filename, &span, &suffix)
        });
        if !segments.is_empty() {
            debug!(count = segments.len(), "Globbed alphabetical segments");
            return Some(segments);
        }
    }

    if let Some(caps) = VMDK_SPLIT.captures(&filename) {
        let span = caps.name("num")?.range();
        let segments = collect(dir, 1, |n| splice(&filename, &span, &format!("{:03}", n)));
        if !segments.is_empty() {
            debug!(count = segments.len(), "Globbed split VMDK segments");
            return Some(segments);
        }
    }

    if let Some(caps) = X_OF_N.captures(&filename) {
        let total: u32 = caps.name("total")?.as_str().parse().ok()?;
        let span = caps.name("num")?.range();
        let segments = collect_bounded(dir, 1, total, |n| {
            splice(&filename, &span, &n.to_string())
        });
        if !segments.is_empty() {
            debug!(count = segments.len(), "Globbed counted segments");
            return Some(segments);
        }
    }

    if let Some(caps) = trailing_digit_captures(&filename) {
        let span = caps.name("num")?.range();
        for start in [0u32, 1u32] {
            let segments = collect(dir, start, |n| splice(&filename, &span, &n.to_string()));
            if !segments.is_empty() {
                debug!(count = segments.len(), "Globbed trailing-digit segments");
                return Some(segments);
            }
        }
    }

    None
}

/// Replace the byte span of the matched sequence with `replacement`,
/// keeping the rest of the name (and its casing) intact
fn splice(filename: &str, span: &Range<usize>, replacement: &str) -> String {
    format!(
        "{}{}{}",
        &filename[..span.start],
        replacement,
        &filename[span.end..]
    )
}

/// Collect consecutive existing segments starting at `start`.
/// Empty when the first segment does not exist.
fn collect(dir: &Path, start: u32, name_for: impl Fn(u32) -> String) -> Vec<PathBuf> {
    collect_bounded(dir, start, u32::MAX, name_for)
}

fn collect_bounded(
    dir: &Path,
    start: u32,
    last: u32,
    name_for: impl Fn(u32) -> String,
) -> Vec<PathBuf> {
    let mut segments = Vec::new();
    let mut num = start;
    while num <= last {
        let candidate = dir.join(name_for(num));
        if !candidate.exists() {
            break;
        }
        segments.push(candidate);
        num += 1;
    }
    segments
}

/// Two-letter suffix for alphabetical sets: 0 -> "aa", 1 -> "ab", 26 -> "ba"
fn alpha_suffix(n: u32) -> String {
    let first = b'a' + (n / 26) as u8 % 26;
    let second = b'a' + (n % 26) as u8;
    format!("{}{}", first as char, second as char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_matches_segment_schema() {
        assert!(matches_segment_schema("image.raw.000"));
        assert!(matches_segment_schema("image.001"));
        assert!(matches_segment_schema("image.aa"));
        assert!(matches_segment_schema("DISK.AA"));
        assert!(matches_segment_schema("disk-f001.vmdk"));
        assert!(matches_segment_schema("image.1of5"));
        assert!(matches_segment_schema("disk1"));
        assert!(!matches_segment_schema("notes.txt"));
        assert!(!matches_segment_schema("image.e01"));
        assert!(!matches_segment_schema("IMAGE.E01"));
        assert!(!matches_segment_schema("backup.s02"));
    }

    #[test]
    fn test_glob_numbered_segments() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            File::create(dir.path().join(format!("image.raw.{:03}", i))).unwrap();
        }
        let segments = glob_raw_segments(&dir.path().join("image.raw.002")).unwrap();
        assert_eq!(segments.len(), 5);
        assert!(segments[0].ends_with("image.raw.000"));
        assert!(segments[4].ends_with("image.raw.004"));
    }

    #[test]
    fn test_glob_stops_at_gap() {
        let dir = tempfile::tempdir().unwrap();
        for i in [1u32, 2, 4] {
            File::create(dir.path().join(format!("image.{:03}", i))).unwrap();
        }
        let segments = glob_raw_segments(&dir.path().join("image.001")).unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_glob_alphabetical() {
        let dir = tempfile::tempdir().unwrap();
        for suffix in ["aa", "ab", "ac"] {
            File::create(dir.path().join(format!("disk.{}", suffix))).unwrap();
        }
        let segments = glob_raw_segments(&dir.path().join("disk.ab")).unwrap();
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn test_glob_uppercase_alphabetical() {
        let dir = tempfile::tempdir().unwrap();
        for suffix in ["AA", "AB", "AC"] {
            File::create(dir.path().join(format!("DISK.{}", suffix))).unwrap();
        }
        assert!(matches_segment_schema("DISK.AA"));
        let segments = glob_raw_segments(&dir.path().join("DISK.AA")).unwrap();
        assert_eq!(segments.len(), 3);
        assert!(segments[2].ends_with("DISK.AC"));
    }

    #[test]
    fn test_glob_counted_set() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=3 {
            File::create(dir.path().join(format!("image.{}of3", i))).unwrap();
        }
        let segments = glob_raw_segments(&dir.path().join("image.1of3")).unwrap();
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn test_glob_missing_first_segment() {
        let dir = tempfile::tempdir().unwrap();
        // Name matches the numbered schema but no .000/.001 exists
        File::create(dir.path().join("image.007")).unwrap();
        assert!(glob_raw_segments(&dir.path().join("image.007")).is_none());
    }

    #[test]
    fn test_glob_unrelated_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.txt");
        File::create(&path).unwrap();
        assert!(glob_raw_segments(&path).is_none());
    }

    #[test]
    fn test_extension_digits_do_not_glob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.e01");
        File::create(&path).unwrap();
        assert!(glob_raw_segments(&path).is_none());
    }

    #[test]
    fn test_alpha_suffix() {
        assert_eq!(alpha_suffix(0), "aa");
        assert_eq!(alpha_suffix(1), "ab");
        assert_eq!(alpha_suffix(26), "ba");
    }
}
