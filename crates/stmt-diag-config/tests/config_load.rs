// crates/stmt-diag-config/tests/config_load.rs
// =============================================================================
// Module: Config Loading and Validation Tests
// Description: Validate defaults, limits, and fail-closed parsing.
// Purpose: Ensure minimal config is valid and invalid inputs are rejected.
// =============================================================================

//! Config loading and validation tests for stmt-diag-config.

#![allow(clippy::use_debug, reason = "Test failure messages include debug output.")]

use std::time::Duration;

use stmt_diag_config::ConfigError;
use stmt_diag_config::LogSinkKind;
use stmt_diag_config::StmtDiagConfig;
use stmt_diag_store_sqlite::SqliteStoreMode;
use stmt_diag_store_sqlite::SqliteSyncMode;

type TestResult = Result<(), String>;

const MINIMAL: &str = "[store]\npath = \"diag.sqlite\"\n";

fn assert_invalid(result: Result<StmtDiagConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn minimal_config_uses_defaults() -> TestResult {
    let config = StmtDiagConfig::from_toml_str(MINIMAL).map_err(|err| err.to_string())?;
    if config.store.journal_mode != SqliteStoreMode::Wal
        || config.store.sync_mode != SqliteSyncMode::Full
        || config.store.busy_timeout_ms != 5_000
    {
        return Err(format!("unexpected store defaults: {:?}", config.store));
    }
    if config.registry.poller_config(None).interval != Duration::from_secs(10) {
        return Err("poll interval should default to 10s".to_string());
    }
    if config.registry.registry_config().broadcast_ttl != Duration::ZERO {
        return Err("broadcast ttl should default to zero".to_string());
    }
    if config.logging.sink != LogSinkKind::Stderr {
        return Err("logging should default to stderr".to_string());
    }
    Ok(())
}

#[test]
fn full_config_parses() -> TestResult {
    let content = r#"
[store]
path = "/var/lib/stmt-diag/diag.sqlite"
busy_timeout_ms = 250
journal_mode = "delete"
sync_mode = "normal"

[registry]
poll_interval_ms = 500
broadcast_ttl_ms = 60000

[logging]
sink = "file"
path = "/var/log/stmt-diag/events.jsonl"
"#;
    let config = StmtDiagConfig::from_toml_str(content).map_err(|err| err.to_string())?;
    let poller = config.registry.poller_config(Some(3));
    if poller.interval != Duration::from_millis(500) || poller.max_rounds != Some(3) {
        return Err(format!("unexpected poller config: {poller:?}"));
    }
    if config.registry.registry_config().broadcast_ttl != Duration::from_secs(60) {
        return Err("unexpected broadcast ttl".to_string());
    }
    if config.store.journal_mode != SqliteStoreMode::Delete {
        return Err("journal mode not parsed".to_string());
    }
    Ok(())
}

#[test]
fn missing_store_section_is_rejected() -> TestResult {
    assert_invalid(StmtDiagConfig::from_toml_str("[registry]\n"), "parse error")
}

#[test]
fn unknown_fields_are_rejected() -> TestResult {
    assert_invalid(
        StmtDiagConfig::from_toml_str("[store]\npath = \"a.db\"\nretention = 3\n"),
        "parse error",
    )
}

#[test]
fn poll_interval_out_of_range_is_rejected() -> TestResult {
    assert_invalid(
        StmtDiagConfig::from_toml_str(&format!("{MINIMAL}[registry]\npoll_interval_ms = 10\n")),
        "registry.poll_interval_ms",
    )?;
    assert_invalid(
        StmtDiagConfig::from_toml_str(&format!(
            "{MINIMAL}[registry]\npoll_interval_ms = 3600001\n"
        )),
        "registry.poll_interval_ms",
    )
}

#[test]
fn zero_busy_timeout_is_rejected() -> TestResult {
    assert_invalid(
        StmtDiagConfig::from_toml_str("[store]\npath = \"a.db\"\nbusy_timeout_ms = 0\n"),
        "store.busy_timeout_ms",
    )
}

#[test]
fn empty_store_path_is_rejected() -> TestResult {
    assert_invalid(StmtDiagConfig::from_toml_str("[store]\npath = \"\"\n"), "store.path")
}

#[test]
fn file_sink_requires_path() -> TestResult {
    assert_invalid(
        StmtDiagConfig::from_toml_str(&format!("{MINIMAL}[logging]\nsink = \"file\"\n")),
        "logging.path is required",
    )
}

#[test]
fn path_without_file_sink_is_rejected() -> TestResult {
    assert_invalid(
        StmtDiagConfig::from_toml_str(&format!(
            "{MINIMAL}[logging]\nsink = \"none\"\npath = \"events.jsonl\"\n"
        )),
        "only valid for the file sink",
    )
}

#[test]
fn load_reads_explicit_path() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("stmt-diag.toml");
    std::fs::write(&path, MINIMAL).map_err(|err| err.to_string())?;
    let config = StmtDiagConfig::load(Some(path.as_path())).map_err(|err| err.to_string())?;
    if config.store.path != std::path::Path::new("diag.sqlite") {
        return Err("store path not loaded".to_string());
    }
    Ok(())
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("stmt-diag.toml");
    let padding = "#".repeat(1024 * 1024);
    std::fs::write(&path, format!("{MINIMAL}{padding}\n")).map_err(|err| err.to_string())?;
    assert_invalid(StmtDiagConfig::load(Some(path.as_path())), "size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("stmt-diag.toml");
    std::fs::write(&path, [0xff_u8, 0xfe, 0x00]).map_err(|err| err.to_string())?;
    assert_invalid(StmtDiagConfig::load(Some(path.as_path())), "utf-8")
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let result = StmtDiagConfig::load(Some(dir.path().join("absent.toml").as_path()));
    match result {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

#[test]
fn file_sink_opens_configured_path() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let log_path = dir.path().join("events.jsonl");
    let content = format!(
        "{MINIMAL}[logging]\nsink = \"file\"\npath = \"{}\"\n",
        log_path.display()
    );
    let config = StmtDiagConfig::from_toml_str(&content).map_err(|err| err.to_string())?;
    config.logging.open_sink().map_err(|err| err.to_string())?;
    if !log_path.exists() {
        return Err("file sink did not create the log file".to_string());
    }
    Ok(())
}
