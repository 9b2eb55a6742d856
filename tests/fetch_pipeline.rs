//! End-to-end fetch cycles against an in-memory remote.
//!
//! Each test builds a remote log directory with [`MemoryRemote`], runs a
//! full cycle into a temp directory and checks both the returned outcome and
//! what ended up on local disk.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use logfetch::config::FetchConfig;
use logfetch::logs::{Category, FetchError, Fetcher, TransferError};
use logfetch::remote::MemoryRemote;
use tempfile::TempDir;

fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_717_000_000, 0).unwrap()
}

fn config() -> FetchConfig {
    FetchConfig {
        log_dir: "/home/ops/logs".into(),
        ..FetchConfig::default()
    }
}

/// Four categories modified within one minute of each other.
fn consistent_remote() -> MemoryRemote {
    let t = base_time();
    MemoryRemote::new("/home/ops/logs")
        .with_file("ext_2024.log", t, "boot\nrequest SRN42 accepted\ndone\n")
        .with_file("atm_latest.log", t + Duration::seconds(20), "atm trace\n")
        .with_file("base_x.log", t + Duration::seconds(40), "base\n")
        .with_file("bootstrap_y.log", t - Duration::seconds(15), "bootstrap\n")
}

fn local_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Success
// =============================================================================

#[test]
fn consistent_set_is_downloaded() {
    let remote = consistent_remote();
    let cfg = config();
    let tmp = TempDir::new().unwrap();

    let report = Fetcher::new(&remote, &cfg).run("SRN42", tmp.path()).unwrap();

    assert_eq!(
        report.file_names(),
        vec![
            "ext_2024.log",
            "atm_latest.log",
            "base_x.log",
            "bootstrap_y.log"
        ]
    );
    assert_eq!(
        local_names(tmp.path()),
        vec![
            "atm_latest.log",
            "base_x.log",
            "bootstrap_y.log",
            "ext_2024.log"
        ]
    );
    assert_eq!(
        fs::read_to_string(tmp.path().join("ext_2024.log")).unwrap(),
        "boot\nrequest SRN42 accepted\ndone\n"
    );
    assert_eq!(report.skew_secs, 20);
}

#[test]
fn every_content_match_is_fetched_and_newest_latest_wins() {
    let t = base_time();
    let remote = MemoryRemote::new("/home/ops/logs")
        .with_file("ext_a.log", t - Duration::seconds(30), "SRN42\n")
        .with_file("ext_b.log", t, "no marker here\n")
        .with_file("ext_c.log", t + Duration::seconds(10), "x SRN42 y\n")
        .with_file("atm_old.log", t - Duration::seconds(3600), "old\n")
        .with_file("atm_new.log", t, "new\n")
        .with_file("base.log", t, "")
        .with_file("bootstrap.log", t, "");
    let cfg = config();
    let tmp = TempDir::new().unwrap();

    let report = Fetcher::new(&remote, &cfg).run("SRN42", tmp.path()).unwrap();

    let names = report.file_names();
    assert!(names.contains(&"ext_a.log".to_string()));
    assert!(names.contains(&"ext_c.log".to_string()));
    assert!(!names.contains(&"ext_b.log".to_string()));
    assert!(names.contains(&"atm_new.log".to_string()));
    assert!(!names.contains(&"atm_old.log".to_string()));
    // Newest content match (ext_c at +10s) against atm_new at 0s.
    assert_eq!(report.skew_secs, 10);
}

#[test]
fn custom_category_set_from_config() {
    let t = base_time();
    let remote = MemoryRemote::new("/srv/logs")
        .with_file("gw_1.log", t, "trace SRN7\n")
        .with_file("switch_1.log", t, "");
    let cfg = FetchConfig {
        log_dir: "/srv/logs".into(),
        reference_keyword: "switch".into(),
        categories: vec![Category::content_match("gw"), Category::latest("switch")],
        ..FetchConfig::default()
    };
    let tmp = TempDir::new().unwrap();

    let report = Fetcher::new(&remote, &cfg).run("SRN7", tmp.path()).unwrap();
    assert_eq!(report.file_names(), vec!["gw_1.log", "switch_1.log"]);
}

// =============================================================================
// Rejections before any write
// =============================================================================

#[test]
fn skewed_reference_rejects_batch() {
    let t = base_time();
    let remote = MemoryRemote::new("/home/ops/logs")
        .with_file("ext_2024.log", t, "SRN42\n")
        .with_file("atm_latest.log", t - Duration::minutes(5), "atm\n")
        .with_file("base_x.log", t, "")
        .with_file("bootstrap_y.log", t, "");
    let cfg = config();
    let tmp = TempDir::new().unwrap();

    let err = Fetcher::new(&remote, &cfg)
        .run("SRN42", tmp.path())
        .unwrap_err();

    match &err {
        FetchError::ConsistencyViolation {
            skew_secs,
            max_skew_secs,
            ..
        } => {
            assert_eq!(*skew_secs, 300);
            assert_eq!(*max_skew_secs, 120);
        }
        other => panic!("expected ConsistencyViolation, got {other:?}"),
    }
    assert!(err.is_policy_rejection());
    assert!(local_names(tmp.path()).is_empty());
}

#[test]
fn missing_lookup_key_downloads_nothing() {
    let t = base_time();
    let remote = MemoryRemote::new("/home/ops/logs")
        .with_file("ext_2024.log", t, "SRN41\nSRN43\n")
        .with_file("atm_latest.log", t, "")
        .with_file("base_x.log", t, "")
        .with_file("bootstrap_y.log", t, "");
    let cfg = config();
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("SRN42");

    let err = Fetcher::new(&remote, &cfg).run("SRN42", &dest).unwrap_err();

    assert!(
        matches!(err, FetchError::ContentNotFound { ref keyword, .. } if keyword == "ext"),
        "got {err:?}"
    );
    assert!(!dest.exists());
    // Only the scan opened a file.
    assert_eq!(remote.open_count(), 1);
}

#[test]
fn missing_category_is_reported_by_keyword() {
    let t = base_time();
    let remote = MemoryRemote::new("/home/ops/logs")
        .with_file("ext_2024.log", t, "SRN42\n")
        .with_file("atm_latest.log", t, "")
        .with_file("bootstrap_y.log", t, "");
    let cfg = config();
    let tmp = TempDir::new().unwrap();

    let err = Fetcher::new(&remote, &cfg)
        .run("SRN42", tmp.path())
        .unwrap_err();
    assert_eq!(err.to_string(), "base logs not found");
    assert!(local_names(tmp.path()).is_empty());
}

// =============================================================================
// Rollback
// =============================================================================

#[test]
fn failed_transfer_rolls_back_whole_batch() {
    let remote = consistent_remote().failing_read_after_content("base_x.log");
    let cfg = config();
    let tmp = TempDir::new().unwrap();

    let err = Fetcher::new(&remote, &cfg)
        .run("SRN42", tmp.path())
        .unwrap_err();

    match &err {
        FetchError::Download(download) => {
            assert_eq!(download.attempted, 4);
            assert_eq!(download.failures.len(), 1);
            assert_eq!(download.failures[0].name, "base_x.log");
        }
        other => panic!("expected Download, got {other:?}"),
    }
    assert!(local_names(tmp.path()).is_empty());
}

#[test]
fn failed_transfer_removes_destination_dirs_it_created() {
    let remote = consistent_remote().failing_open("base_x.log");
    let cfg = config();
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("a/b/out");

    let err = Fetcher::new(&remote, &cfg).run("SRN42", &dest).unwrap_err();

    assert!(matches!(err, FetchError::Download(_)), "got {err:?}");
    assert!(!dest.exists());
    assert!(!tmp.path().join("a").exists());
    assert!(local_names(tmp.path()).is_empty());
}

#[test]
fn failed_transfer_keeps_existing_parent_dirs() {
    let remote = consistent_remote().failing_open("base_x.log");
    let cfg = config();
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("cases")).unwrap();
    let dest = tmp.path().join("cases/SRN42");

    Fetcher::new(&remote, &cfg).run("SRN42", &dest).unwrap_err();

    assert!(!dest.exists());
    assert_eq!(local_names(tmp.path()), vec!["cases"]);
    assert!(local_names(&tmp.path().join("cases")).is_empty());
}

#[test]
fn rollback_spares_preexisting_local_files() {
    let remote = consistent_remote();
    let cfg = config();
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("atm_latest.log"), "operator notes").unwrap();
    fs::write(tmp.path().join("unrelated.txt"), "keep").unwrap();

    let err = Fetcher::new(&remote, &cfg)
        .run("SRN42", tmp.path())
        .unwrap_err();

    match &err {
        FetchError::Download(download) => {
            assert!(matches!(
                download.failures[0].error,
                TransferError::Create { .. }
            ));
        }
        other => panic!("expected Download, got {other:?}"),
    }
    assert_eq!(local_names(tmp.path()), vec!["atm_latest.log", "unrelated.txt"]);
    assert_eq!(
        fs::read_to_string(tmp.path().join("atm_latest.log")).unwrap(),
        "operator notes"
    );
}

#[test]
fn unreadable_remote_file_rolls_back() {
    let remote = consistent_remote().failing_open("bootstrap_y.log");
    let cfg = config();
    let tmp = TempDir::new().unwrap();

    let err = Fetcher::new(&remote, &cfg)
        .run("SRN42", tmp.path())
        .unwrap_err();
    assert_eq!(err.stage().to_string(), "download");
    assert!(local_names(tmp.path()).is_empty());
}

#[test]
fn repeated_cycles_are_independent() {
    let remote = consistent_remote();
    let cfg = config();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    let a = Fetcher::new(&remote, &cfg).run("SRN42", first.path()).unwrap();
    let b = Fetcher::new(&remote, &cfg).run("SRN42", second.path()).unwrap();
    assert_eq!(a.file_names(), b.file_names());

    // Same destination again: files already exist, so the second run fails
    // and leaves the first run's files in place.
    let err = Fetcher::new(&remote, &cfg)
        .run("SRN42", first.path())
        .unwrap_err();
    assert_eq!(err.stage().to_string(), "download");
    assert_eq!(local_names(first.path()).len(), 4);
}
