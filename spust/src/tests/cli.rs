use crate::{Cli, Commands};

use std::path::PathBuf;

use clap::Parser;
use googletest::assert_that;
use googletest::prelude::eq;

#[test]
fn given_build_with_stats_when_parsed_then_flag_and_src_dir_are_set() {
    // When
    let cli = Cli::try_parse_from(["spust", "build", "app", "--stats"]).unwrap();

    // Then
    assert_that!(
        cli.command,
        eq(&Commands::Build {
            src_dir: PathBuf::from("app"),
            stats: true,
        })
    );
    assert_that!(cli.work_dir, eq(&PathBuf::from(".")));
}

#[test]
fn given_start_without_src_dir_when_parsed_then_src_is_default() {
    // When
    let cli = Cli::try_parse_from(["spust", "start"]).unwrap();

    // Then
    assert_that!(
        cli.command,
        eq(&Commands::Start {
            src_dir: PathBuf::from("src"),
        })
    );
}

#[test]
fn given_global_work_dir_after_subcommand_when_parsed_then_it_applies() {
    // When
    let cli = Cli::try_parse_from(["spust", "start", "--work-dir", "/tmp/app"]).unwrap();

    // Then
    assert_that!(cli.work_dir, eq(&PathBuf::from("/tmp/app")));
}

#[test]
fn given_unknown_subcommand_when_parsed_then_error() {
    // When
    let result = Cli::try_parse_from(["spust", "serve"]);

    // Then
    assert!(result.is_err());
}
