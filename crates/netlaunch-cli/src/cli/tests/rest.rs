//! Tests for verify, cache, completions and the prompt helpers.

use std::path::PathBuf;

use clap_complete::Shell;
use netlaunch_core::verify::JarStatus;

use clap::Parser;

use super::parse;
use crate::cli::commands::CacheAction;
use crate::cli::CliCommand;

#[test]
fn cli_parse_verify() {
    match parse(&["netlaunch", "verify", "a.jar", "b.jar"]) {
        CliCommand::Verify { jars } => {
            assert_eq!(jars, vec![PathBuf::from("a.jar"), PathBuf::from("b.jar")]);
        }
        _ => panic!("expected Verify"),
    }
}

#[test]
fn cli_verify_requires_a_jar() {
    assert!(crate::cli::Cli::try_parse_from(["netlaunch", "verify"]).is_err());
}

#[test]
fn cli_parse_cache_actions() {
    assert!(matches!(
        parse(&["netlaunch", "cache", "list"]),
        CliCommand::Cache {
            action: CacheAction::List
        }
    ));
    assert!(matches!(
        parse(&["netlaunch", "cache", "clear"]),
        CliCommand::Cache {
            action: CacheAction::Clear
        }
    ));
    assert!(matches!(
        parse(&["netlaunch", "cache", "path"]),
        CliCommand::Cache {
            action: CacheAction::Path
        }
    ));
}

#[test]
fn cli_parse_completions() {
    match parse(&["netlaunch", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        _ => panic!("expected Completions"),
    }
}

#[test]
fn prompt_answers() {
    use crate::cli::prompt::is_yes;
    assert!(is_yes("y\n"));
    assert!(is_yes(" YES "));
    assert!(!is_yes(""));
    assert!(!is_yes("no"));
    assert!(!is_yes("yep"));
}

#[test]
fn jar_status_labels() {
    use crate::cli::commands::status_label;
    assert_eq!(status_label(&JarStatus::Signed), "signed");
    assert_eq!(status_label(&JarStatus::Partial), "partial");
    assert_eq!(
        status_label(&JarStatus::Error("tampered".into())),
        "error: tampered"
    );
}
