//! Content scanner for the content-matched category.
//!
//! Every candidate file is opened and read line by line until a line
//! contains the lookup key. Files are scanned in parallel; a file that
//! cannot be opened or read is logged and skipped without affecting its
//! siblings.

use std::io::{self, BufRead, BufReader, Read};

use rayon::prelude::*;

use super::catalog::Catalog;
use super::error::FetchError;
use crate::remote::{RemoteEntry, RemoteFs};

/// Return every `keyword` file whose body contains `marker`, in catalog order.
pub fn scan_for_marker<'a>(
    remote: &dyn RemoteFs,
    catalog: &'a Catalog,
    keyword: &str,
    marker: &str,
) -> Result<Vec<&'a RemoteEntry>, FetchError> {
    let candidates: Vec<&RemoteEntry> = catalog.candidates(keyword).collect();

    // Collect preserves input order, so matches stay in catalog order.
    let outcomes: Vec<(&RemoteEntry, Result<bool, String>)> = candidates
        .par_iter()
        .map(|entry| (*entry, scan_one(remote, catalog, entry, marker)))
        .collect();

    let mut matches = Vec::new();
    let mut failed = 0;
    for (entry, outcome) in outcomes {
        match outcome {
            Ok(true) => matches.push(entry),
            Ok(false) => {}
            Err(message) => {
                failed += 1;
                tracing::warn!(keyword, file = %entry.name, error = %message, "scan failed");
            }
        }
    }

    tracing::info!(
        keyword,
        candidates = candidates.len(),
        matched = matches.len(),
        failed,
        "content scan completed"
    );

    if matches.is_empty() {
        return Err(FetchError::ContentNotFound {
            keyword: keyword.to_string(),
            lookup_key: marker.to_string(),
            candidates: candidates.len(),
            failed,
        });
    }
    Ok(matches)
}

fn scan_one(
    remote: &dyn RemoteFs,
    catalog: &Catalog,
    entry: &RemoteEntry,
    marker: &str,
) -> Result<bool, String> {
    let reader = remote
        .open(&catalog.path_of(&entry.name))
        .map_err(|e| e.to_string())?;
    contains_marker(reader, marker.as_bytes()).map_err(|e| format!("read failed: {e}"))
}

/// True once any line contains `marker`. Reading stops at the first hit.
///
/// Lines are compared as raw bytes so non-UTF-8 noise never aborts a scan.
pub fn contains_marker(reader: impl Read, marker: &[u8]) -> io::Result<bool> {
    if marker.is_empty() {
        return Ok(true);
    }
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(false);
        }
        if line.windows(marker.len()).any(|w| w == marker) {
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn names(entries: &[&RemoteEntry]) -> Vec<String> {
        entries.iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_contains_marker_line_by_line() {
        let body = "boot\nsession SRN123 opened\nshutdown\n";
        assert!(contains_marker(body.as_bytes(), b"SRN123").unwrap());
        assert!(!contains_marker(body.as_bytes(), b"SRN999").unwrap());
        // Last line without trailing newline still counts.
        assert!(contains_marker("a\nb SRN1".as_bytes(), b"SRN1").unwrap());
        // The marker never spans lines.
        assert!(!contains_marker("SRN\n123".as_bytes(), b"SRN123").unwrap());
    }

    #[test]
    fn test_contains_marker_tolerates_binary() {
        let mut body = vec![0xff, 0xfe, b'\n'];
        body.extend_from_slice(b"\x00SRN7\x00\n");
        assert!(contains_marker(body.as_slice(), b"SRN7").unwrap());
    }

    #[test]
    fn test_returns_every_matching_file() {
        let remote = MemoryRemote::new("/logs")
            .with_file("ext_a.log", at(1), "x\nSRN123\n")
            .with_file("ext_b.log", at(2), "nothing here\n")
            .with_file("ext_c.log", at(3), "SRN123 again\n")
            .with_file("atm.log", at(4), "SRN123\n");
        let catalog = Catalog::read(&remote, "/logs").unwrap();
        let matches = scan_for_marker(&remote, &catalog, "ext", "SRN123").unwrap();
        assert_eq!(names(&matches), vec!["ext_a.log", "ext_c.log"]);
    }

    #[test]
    fn test_stops_reading_at_first_match() {
        // The reader fails after its contents; a scan that kept going would error.
        let remote = MemoryRemote::new("/logs")
            .with_file("ext_a.log", at(1), "SRN5\nmore\n")
            .failing_read_after_content("ext_a.log");
        let catalog = Catalog::read(&remote, "/logs").unwrap();
        let matches = scan_for_marker(&remote, &catalog, "ext", "SRN5").unwrap();
        assert_eq!(names(&matches), vec!["ext_a.log"]);
    }

    #[test]
    fn test_failed_file_does_not_abort_siblings() {
        let remote = MemoryRemote::new("/logs")
            .with_file("ext_a.log", at(1), "SRN5\n")
            .with_file("ext_b.log", at(2), "SRN5\n")
            .with_file("ext_c.log", at(3), "no marker\n")
            .failing_open("ext_a.log")
            .failing_read_after_content("ext_c.log");
        let catalog = Catalog::read(&remote, "/logs").unwrap();
        let matches = scan_for_marker(&remote, &catalog, "ext", "SRN5").unwrap();
        assert_eq!(names(&matches), vec!["ext_b.log"]);
    }

    #[test]
    fn test_all_unreadable_is_content_not_found() {
        let remote = MemoryRemote::new("/logs")
            .with_file("ext_a.log", at(1), "SRN5\n")
            .with_file("ext_b.log", at(2), "SRN5\n")
            .failing_open("ext_a.log")
            .failing_open("ext_b.log");
        let catalog = Catalog::read(&remote, "/logs").unwrap();
        let err = scan_for_marker(&remote, &catalog, "ext", "SRN5").unwrap_err();
        match err {
            FetchError::ContentNotFound {
                candidates, failed, ..
            } => {
                assert_eq!(candidates, 2);
                assert_eq!(failed, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_candidates_is_content_not_found() {
        let remote = MemoryRemote::new("/logs").with_file("atm.log", at(1), "SRN5\n");
        let catalog = Catalog::read(&remote, "/logs").unwrap();
        let err = scan_for_marker(&remote, &catalog, "ext", "SRN5").unwrap_err();
        assert_eq!(
            err.to_string(),
            "ext logs not found: no file of 0 contains `SRN5` (0 unreadable)"
        );
    }
}
