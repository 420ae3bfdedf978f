//! Tests for `run`.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_run_defaults() {
    match parse(&["archivist", "run"]) {
        CliCommand::Run {
            seed,
            archive,
            headful,
            jobs,
        } => {
            assert!(seed.is_none());
            assert!(archive.is_none());
            assert!(!headful);
            assert!(jobs.is_none());
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_all_flags() {
    match parse(&[
        "archivist",
        "run",
        "--seed",
        "https://photos.google.com/photo/AF1Qip",
        "--archive",
        "/srv/photos",
        "--headful",
        "--jobs",
        "4",
    ]) {
        CliCommand::Run {
            seed,
            archive,
            headful,
            jobs,
        } => {
            assert_eq!(seed.as_deref(), Some("https://photos.google.com/photo/AF1Qip"));
            assert_eq!(archive, Some(PathBuf::from("/srv/photos")));
            assert!(headful);
            assert_eq!(jobs, Some(4));
        }
        _ => panic!("expected Run with flags"),
    }
}

#[test]
fn cli_parse_run_rejects_bad_jobs() {
    assert!(Cli::try_parse_from(["archivist", "run", "--jobs", "many"]).is_err());
}
