//! Integration tests for the order analytics ETL pipeline.
//!
//! These tests run the pipeline end to end against CSV fixtures and write
//! outputs into temporary directories.

use order_etl::{
    EtlError, Pipeline, PipelineConfig, PipelineStage, RunMetadata, SchemaEnforcer, StageUpdate,
};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn config_for(root: &Path, orders: &str, users: &str) -> PipelineConfig {
    PipelineConfig::builder()
        .root(root)
        .raw_orders(fixtures_path().join(orders))
        .raw_users(fixtures_path().join(users))
        .build()
        .expect("valid config")
}

fn read_parquet(path: &Path) -> DataFrame {
    let file = File::open(path).expect("parquet output exists");
    ParquetReader::new(file).finish().expect("readable parquet")
}

/// Every file under `dir`, recursively.
fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if !dir.exists() {
        return files;
    }
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

fn recording_pipeline(config: PipelineConfig) -> (Pipeline, Arc<Mutex<Vec<StageUpdate>>>) {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let pipeline = Pipeline::builder()
        .config(config)
        .on_progress(move |update| sink.lock().unwrap().push(update))
        .build()
        .unwrap();
    (pipeline, updates)
}

// ============================================================================
// Successful Runs
// ============================================================================

#[test]
fn test_full_run_writes_all_outputs() {
    let dir = TempDir::new().unwrap();
    let config = config_for(dir.path(), "orders.csv", "users.csv");
    let pipeline = Pipeline::builder().config(config.clone()).build().unwrap();

    let outcome = pipeline.run().unwrap();

    assert_eq!(outcome.final_stage, PipelineStage::MetadataWritten);
    assert_eq!(outcome.analytics_rows, 7);
    for path in [
        &config.out_orders_clean,
        &config.out_users,
        &config.out_analytics,
        &config.run_meta,
    ] {
        assert!(path.exists(), "missing output {}", path.display());
    }

    let analytics = read_parquet(&config.out_analytics);
    assert_eq!(analytics.height(), 7);
    let users = read_parquet(&config.out_users);
    assert_eq!(users.height(), 4);
}

#[test]
fn test_run_metadata_document() {
    let dir = TempDir::new().unwrap();
    let config = config_for(dir.path(), "orders.csv", "users.csv");
    Pipeline::builder()
        .config(config.clone())
        .build()
        .unwrap()
        .run()
        .unwrap();

    let text = std::fs::read_to_string(&config.run_meta).unwrap();
    let meta: RunMetadata = serde_json::from_str(&text).unwrap();

    assert_eq!(meta.rows_out, 7);
    assert_eq!(meta.missing_created_at, Some(1));
    // order A0006 belongs to an unknown user
    let rate = meta.country_match_rate.unwrap();
    assert!((rate - 6.0 / 7.0).abs() < 1e-12);
    assert_eq!(meta.config, config.snapshot());
    assert_eq!(meta.config["iqr_k"], "1.5");
}

#[test]
fn test_analytics_content() {
    let dir = TempDir::new().unwrap();
    let config = config_for(dir.path(), "orders.csv", "users.csv");
    Pipeline::builder()
        .config(config.clone())
        .build()
        .unwrap()
        .run()
        .unwrap();

    let analytics = read_parquet(&config.out_analytics);

    let order_ids: Vec<Option<&str>> = analytics
        .column("order_id")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(
        order_ids,
        vec![
            Some("A0001"),
            Some("A0002"),
            Some("A0003"),
            Some("A0004"),
            Some("A0005"),
            Some("A0006"),
            Some("A0007")
        ]
    );

    let status: Vec<Option<&str>> = analytics
        .column("status_clean")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(
        status,
        vec![
            Some("paid"),
            Some("paid"),
            Some("refund"),
            Some("refund"),
            Some("paid"),
            Some("pending"),
            Some("paid")
        ]
    );

    let country = analytics.column("country").unwrap().str().unwrap();
    assert_eq!(country.get(0), Some("SA"));
    assert_eq!(country.get(1), Some("AE"));
    assert_eq!(country.get(5), None);

    // "abc" and "" in the amount column
    let amount_isna = analytics.column("amount__isna").unwrap().bool().unwrap();
    assert_eq!(amount_isna.get(2), Some(true));
    assert_eq!(amount_isna.get(3), Some(true));
    assert_eq!(amount_isna.sum(), Some(2));

    let outliers = analytics.column("amount_outlier").unwrap().bool().unwrap();
    assert_eq!(outliers.get(6), Some(true));
    assert_eq!(outliers.sum(), Some(1));

    let winsor = analytics.column("amount_winsor").unwrap().f64().unwrap();
    let amount = analytics.column("amount").unwrap().f64().unwrap();
    assert!(winsor.get(6).unwrap() < 250.0);
    assert_eq!(winsor.get(0), amount.get(0));
    assert_eq!(winsor.get(2), None);
}

#[test]
fn test_progress_walks_every_stage() {
    let dir = TempDir::new().unwrap();
    let config = config_for(dir.path(), "orders.csv", "users.csv");
    let (pipeline, updates) = recording_pipeline(config);

    pipeline.run().unwrap();

    let stages: Vec<PipelineStage> = updates.lock().unwrap().iter().map(|u| u.stage).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::Extracted,
            PipelineStage::SchemaEnforced,
            PipelineStage::QualityChecked,
            PipelineStage::Joined,
            PipelineStage::OutlierTreated,
            PipelineStage::Persisted,
            PipelineStage::MetadataWritten,
        ]
    );
}

#[test]
fn test_reports_written_when_configured() {
    let dir = TempDir::new().unwrap();
    let reports = dir.path().join("reports");
    let config = PipelineConfig::builder()
        .root(dir.path())
        .raw_orders(fixtures_path().join("orders.csv"))
        .raw_users(fixtures_path().join("users.csv"))
        .reports_dir(&reports)
        .build()
        .unwrap();

    let outcome = Pipeline::builder().config(config).build().unwrap().run().unwrap();

    let missingness = reports.join("missingness_orders.csv");
    let revenue = reports.join("revenue_by_country.csv");
    assert!(missingness.exists());
    assert!(revenue.exists());
    assert!(outcome.artifacts.contains(&revenue));

    let text = std::fs::read_to_string(&revenue).unwrap();
    assert!(text.starts_with("country,n,revenue"));
}

#[test]
fn test_coercion_warnings_surface_in_outcome() {
    let dir = TempDir::new().unwrap();
    let outcome = Pipeline::builder()
        .config(config_for(dir.path(), "orders.csv", "users.csv"))
        .build()
        .unwrap()
        .run()
        .unwrap();

    let count = |table: &str, column: &str| {
        outcome
            .coercion_warnings
            .iter()
            .find(|w| w.table == table && w.column == column)
            .map(|w| w.count)
    };
    // empty CSV fields are already null, only "abc" is coerced
    assert_eq!(count("orders", "amount"), Some(1));
    assert_eq!(count("orders", "quantity"), None);
    assert_eq!(count("orders", "created_at"), Some(1));
    assert_eq!(count("users", "signup_date"), Some(1));
    assert_eq!(count("users", "country"), None);
}

#[test]
fn test_process_in_memory_tables() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::from_root(dir.path());

    let orders = df![
        "order_id" => ["1", "2"],
        "user_id" => ["u1", "u2"],
        "amount" => ["3.5", "4"],
        "quantity" => ["1", "1"],
        "created_at" => ["2025-12-01", "2025-12-02"],
        "status" => ["paid", "refunded"],
    ]
    .unwrap();
    let users = df![
        "user_id" => ["u1"],
        "country" => ["sa"],
        "signup_date" => ["2025-01-01"],
    ]
    .unwrap();

    let outcome = Pipeline::builder()
        .config(config.clone())
        .build()
        .unwrap()
        .process(orders, users)
        .unwrap();

    assert_eq!(outcome.metadata.rows_out, 2);
    assert_eq!(outcome.metadata.country_match_rate, Some(0.5));
    assert!(config.out_analytics.exists());
}

#[test]
fn test_transform_is_deterministic() {
    let orders = order_etl::io::read_orders_csv(&fixtures_path().join("orders.csv")).unwrap();
    let users = order_etl::io::read_users_csv(&fixtures_path().join("users.csv")).unwrap();
    let pipeline = Pipeline::builder().build().unwrap();

    let first = pipeline.transform(&orders, &users).unwrap();
    let second = pipeline.transform(&orders, &users).unwrap();

    assert!(first.analytics.equals_missing(&second.analytics));
    // inputs are not modified
    assert_eq!(orders.column("amount").unwrap().dtype(), &DataType::String);
}

#[test]
fn test_schema_enforcement_fixed_point_on_fixture() {
    let orders = order_etl::io::read_orders_csv(&fixtures_path().join("orders.csv")).unwrap();

    let (once, warnings) = SchemaEnforcer::enforce_orders(&orders).unwrap();
    assert!(!warnings.is_empty());

    let (twice, warnings) = SchemaEnforcer::enforce_orders(&once).unwrap();
    assert!(once.equals_missing(&twice));
    assert!(warnings.is_empty());
}

// ============================================================================
// Failed Runs
// ============================================================================

fn assert_failed_run(orders: &str, users: &str, expected_code: &str) -> EtlError {
    let dir = TempDir::new().unwrap();
    let (pipeline, updates) = recording_pipeline(config_for(dir.path(), orders, users));

    let err = pipeline.run().unwrap_err();
    assert_eq!(err.error_code(), expected_code);

    let updates = updates.lock().unwrap();
    let last = updates.last().expect("at least the failure is reported");
    assert_eq!(last.stage, PipelineStage::Failed);
    assert_eq!(last.error_code.as_deref(), Some(expected_code));

    assert_eq!(
        files_under(dir.path()),
        Vec::<PathBuf>::new(),
        "a failed run must not leave files behind"
    );
    err
}

#[test]
fn test_duplicate_user_aborts_run() {
    let err = assert_failed_run("orders.csv", "users_duplicate.csv", "DUPLICATE_KEY");
    assert!(err.is_quality_violation());
    assert!(!err.is_retriable());
}

#[test]
fn test_duplicate_order_id_aborts_run() {
    let err = assert_failed_run("orders_duplicate_id.csv", "users.csv", "DUPLICATE_KEY");
    assert!(matches!(err, EtlError::DuplicateKey { ref column, .. } if column == "order_id"));
}

#[test]
fn test_negative_amount_aborts_run() {
    let err = assert_failed_run("orders_negative.csv", "users.csv", "RANGE_VIOLATION");
    match err {
        EtlError::RangeViolation {
            table,
            column,
            violations,
            min_value,
            ..
        } => {
            assert_eq!(table, "orders");
            assert_eq!(column, "amount");
            assert_eq!(violations, 1);
            assert_eq!(min_value, -8.0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_column_aborts_run() {
    let err = assert_failed_run("orders_missing_status.csv", "users.csv", "MISSING_COLUMNS");
    assert!(err.to_string().contains("status"));
}

#[test]
fn test_empty_orders_aborts_run() {
    assert_failed_run("orders_header_only.csv", "users.csv", "EMPTY_DATASET");
}

#[test]
fn test_missing_input_file_aborts_run() {
    let err = assert_failed_run("does_not_exist.csv", "users.csv", "IO_ERROR");
    assert!(err.is_retriable());
}

#[test]
fn test_failed_run_keeps_previous_outputs() {
    let dir = TempDir::new().unwrap();
    let good = config_for(dir.path(), "orders.csv", "users.csv");
    Pipeline::builder()
        .config(good.clone())
        .build()
        .unwrap()
        .run()
        .unwrap();
    let before = std::fs::read_to_string(&good.run_meta).unwrap();

    let bad = config_for(dir.path(), "orders.csv", "users_duplicate.csv");
    assert!(Pipeline::builder().config(bad).build().unwrap().run().is_err());

    assert_eq!(std::fs::read_to_string(&good.run_meta).unwrap(), before);
}
