//! End-to-end tests against a live PostgreSQL instance
//!
//! These tests validate the full engine loop: bootstrap, locking,
//! resolution, execution, and history tracking. They are skipped unless
//! `FLOODGATE_TEST_DATABASE_URL` points at a disposable database, so the
//! suite passes in environments without PostgreSQL.

use std::fs;
use std::path::Path;
use std::time::Duration;

use floodgate::migration::{
    HistoryTableLock, MigrationError, MigrationLockGuard, Migrator, RunOutcome,
};
use floodgate::{connect, MayPostgresExecutor, MigrationConfig, SqlExecutor};

fn test_url() -> Option<String> {
    match std::env::var("FLOODGATE_TEST_DATABASE_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("FLOODGATE_TEST_DATABASE_URL not set; skipping live database test");
            None
        }
    }
}

fn executor(url: &str) -> MayPostgresExecutor {
    MayPostgresExecutor::new(connect(url).expect("connect to test database"))
}

/// Fresh config with a unique history table so parallel tests don't
/// interfere; drops leftovers from previous runs.
fn test_config(url: &str, executor: &dyn SqlExecutor, name: &str, location: &Path) -> MigrationConfig {
    let history_table = format!("floodgate_test_{name}");
    executor
        .execute(&format!("DROP TABLE IF EXISTS {history_table}"), &[])
        .expect("drop leftover history table");
    executor
        .execute(&format!("DROP TABLE IF EXISTS {name}_accounts"), &[])
        .expect("drop leftover target table");

    MigrationConfig {
        url: url.to_string(),
        locations: vec![location.to_path_buf()],
        history_table,
        lock_timeout_seconds: 10,
        ..MigrationConfig::default()
    }
}

fn write_migration(dir: &Path, name: &str, sql: &str) {
    fs::write(dir.join(name), sql).expect("write migration file");
}

#[test]
fn test_migrate_applies_in_order_and_is_idempotent() {
    let Some(url) = test_url() else { return };
    let executor = executor(&url);
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&url, &executor, "roundtrip", dir.path());

    write_migration(
        dir.path(),
        "V1__init.sql",
        "CREATE TABLE roundtrip_accounts (id BIGINT PRIMARY KEY);",
    );
    write_migration(
        dir.path(),
        "V2__add_column.sql",
        "ALTER TABLE roundtrip_accounts ADD COLUMN name TEXT;",
    );

    let migrator = Migrator::new(config);

    let report = migrator.migrate(&executor).unwrap();
    assert_eq!(report.outcome, RunOutcome::Success);
    let applied: Vec<String> = report
        .applied_versions
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(applied, ["1", "2"]);

    // Second run finds nothing pending and changes no history
    let status_before = migrator.status(&executor).unwrap();
    let report = migrator.migrate(&executor).unwrap();
    assert_eq!(report.outcome, RunOutcome::Success);
    assert!(report.applied_versions.is_empty());
    let status_after = migrator.status(&executor).unwrap();
    assert_eq!(status_before.applied_count, status_after.applied_count);
    assert!(status_after.is_up_to_date());
}

#[test]
fn test_checksum_drift_blocks_the_run() {
    let Some(url) = test_url() else { return };
    let executor = executor(&url);
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&url, &executor, "drift", dir.path());

    write_migration(
        dir.path(),
        "V1__init.sql",
        "CREATE TABLE drift_accounts (id BIGINT PRIMARY KEY);",
    );

    let migrator = Migrator::new(config);
    let report = migrator.migrate(&executor).unwrap();
    assert_eq!(report.outcome, RunOutcome::Success);

    // Edit the applied migration and add a new one
    write_migration(
        dir.path(),
        "V1__init.sql",
        "CREATE TABLE drift_accounts (id BIGINT PRIMARY KEY, edited BOOLEAN);",
    );
    write_migration(
        dir.path(),
        "V2__more.sql",
        "ALTER TABLE drift_accounts ADD COLUMN name TEXT;",
    );

    let report = migrator.migrate(&executor).unwrap();
    assert_eq!(report.outcome, RunOutcome::ValidationFailure);
    assert!(report.applied_versions.is_empty());
    assert_eq!(report.anomalies.len(), 1);

    // validate() surfaces the same finding as an error
    assert!(matches!(
        migrator.validate(&executor),
        Err(MigrationError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_failed_migration_is_recorded_and_blocks_retry() {
    let Some(url) = test_url() else { return };
    let executor = executor(&url);
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&url, &executor, "failure", dir.path());

    write_migration(
        dir.path(),
        "V1__init.sql",
        "CREATE TABLE failure_accounts (id BIGINT PRIMARY KEY);",
    );
    write_migration(dir.path(), "V2__broken.sql", "THIS IS NOT SQL;");
    write_migration(
        dir.path(),
        "V3__never_reached.sql",
        "ALTER TABLE failure_accounts ADD COLUMN name TEXT;",
    );

    let migrator = Migrator::new(config);
    let report = migrator.migrate(&executor).unwrap();

    // Fail-fast: V1 applied, V2 failed, V3 untouched
    assert_eq!(report.outcome, RunOutcome::PartialFailure);
    let applied: Vec<String> = report
        .applied_versions
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(applied, ["1"]);
    assert_eq!(report.failed_version.as_ref().unwrap().to_string(), "2");

    // The failed attempt is now an anomaly: no silent retry
    let report = migrator.migrate(&executor).unwrap();
    assert_eq!(report.outcome, RunOutcome::ValidationFailure);
    assert!(report.applied_versions.is_empty());
}

#[test]
fn test_concurrent_runner_times_out_on_held_lock() {
    let Some(url) = test_url() else { return };
    let holder = executor(&url);
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&url, &holder, "locked", dir.path());

    write_migration(
        dir.path(),
        "V1__init.sql",
        "CREATE TABLE locked_accounts (id BIGINT PRIMARY KEY);",
    );

    // Bootstrap the history table, then hold the lock from this session
    let migrator = Migrator::new(MigrationConfig {
        lock_timeout_seconds: 2,
        ..config.clone()
    });
    migrator.status(&holder).unwrap();

    let guard = MigrationLockGuard::new(
        &holder,
        Box::new(HistoryTableLock::new(&config.history_table)),
        Duration::from_secs(5),
    )
    .unwrap();

    // A second invocation must fail with a lock timeout, quickly
    let contender = executor(&url);
    let started = std::time::Instant::now();
    let result = migrator.migrate(&contender);
    assert!(matches!(result, Err(MigrationError::LockTimeout(_))));
    assert!(started.elapsed() < Duration::from_secs(10));

    // Once released, the same invocation succeeds
    drop(guard);
    let report = migrator.migrate(&contender).unwrap();
    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.applied_versions.len(), 1);
}
