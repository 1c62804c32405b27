//! Tests for launch and fetch.

use std::path::PathBuf;

use clap::Parser;

use super::parse;
use crate::cli::CliCommand;

#[test]
fn cli_parse_launch() {
    match parse(&["netlaunch", "launch", "app.json"]) {
        CliCommand::Launch {
            descriptor,
            trust,
            class,
        } => {
            assert_eq!(descriptor, PathBuf::from("app.json"));
            assert!(!trust);
            assert!(class.is_none());
        }
        _ => panic!("expected Launch"),
    }
}

#[test]
fn cli_parse_launch_with_trust_and_class() {
    match parse(&["netlaunch", "launch", "app.json", "--trust", "--class", "com.example.Tool"]) {
        CliCommand::Launch { trust, class, .. } => {
            assert!(trust);
            assert_eq!(class.as_deref(), Some("com.example.Tool"));
        }
        _ => panic!("expected Launch"),
    }
}

#[test]
fn cli_parse_fetch() {
    match parse(&["netlaunch", "fetch", "https://apps.example.com/lib/app.jar"]) {
        CliCommand::Fetch {
            url,
            version,
            pack,
            size_only,
        } => {
            assert_eq!(url, "https://apps.example.com/lib/app.jar");
            assert!(version.is_none());
            assert!(!pack);
            assert!(!size_only);
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_fetch_options() {
    match parse(&[
        "netlaunch",
        "fetch",
        "https://apps.example.com/app.jar",
        "--version",
        "1.2+",
        "--pack",
        "--size-only",
    ]) {
        CliCommand::Fetch {
            version,
            pack,
            size_only,
            ..
        } => {
            assert_eq!(version.as_deref(), Some("1.2+"));
            assert!(pack);
            assert!(size_only);
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_launch_requires_descriptor() {
    assert!(crate::cli::Cli::try_parse_from(["netlaunch", "launch"]).is_err());
}
