use crate::tests::{EnvGuard, setup_work_dir};
use crate::{BuildConfig, Config};

use googletest::assert_that;
use googletest::prelude::{anything, eq, err, ok};
use serial_test::serial;

// =========================================================================
// Validation Tests - Build
// =========================================================================

#[test]
#[serial]
fn given_blank_build_command_when_validate_then_error() {
    // Given
    let (temp, _guards) = setup_work_dir();
    let _command = EnvGuard::set("SPUST_BUILD_COMMAND", "   ");

    // When
    let config = Config::load(temp.path()).unwrap();
    let result = config.validate();

    // Then
    assert_that!(result, err(anything()));
}

#[test]
#[serial]
fn given_bundle_dir_escaping_work_dir_when_validate_then_error() {
    // Given
    let (temp, _guards) = setup_work_dir();
    let _bundle = EnvGuard::set("SPUST_BUNDLE_DIR", "../elsewhere");

    // When
    let config = Config::load(temp.path()).unwrap();
    let result = config.validate();

    // Then
    assert_that!(result, err(anything()));
}

#[test]
#[serial]
fn given_absolute_bundle_dir_when_validate_then_error() {
    // Given
    let (temp, _guards) = setup_work_dir();
    let _bundle = EnvGuard::set("SPUST_BUNDLE_DIR", "/tmp/bundle");

    // When
    let config = Config::load(temp.path()).unwrap();
    let result = config.validate();

    // Then
    assert_that!(result, err(anything()));
}

#[test]
#[serial]
fn given_nested_bundle_dir_when_validate_then_ok() {
    // Given
    let (temp, _guards) = setup_work_dir();
    let _bundle = EnvGuard::set("SPUST_BUNDLE_DIR", "build/server-bundle");

    // When
    let config = Config::load(temp.path()).unwrap();
    let result = config.validate();

    // Then
    assert_that!(result, ok(anything()));
}

#[test]
fn given_command_with_extra_whitespace_when_parse_command_then_split_on_whitespace() {
    // When
    let command = BuildConfig::parse_command("  cargo   build -p  server ");

    // Then
    assert_that!(
        command,
        eq(&vec![
            "cargo".to_string(),
            "build".to_string(),
            "-p".to_string(),
            "server".to_string()
        ])
    );
}
