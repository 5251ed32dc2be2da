//! End-to-end upsert tests against a temporary SQLite database.
//!
//! Failure paths are driven by real constraint violations:
//! - NOT NULL declared in the table description fails the staging load
//! - a CHECK present only on the target fails the policy statements
//! - a pre-existing table at the staging name fails staging creation

mod common;

use common::*;
use upsert_kit::{
    inspect, Column, Record, SqlValue, StagingRegistry, Table, UpsertCounts, UpsertError,
    UpsertOptions,
};

fn counts(policy_rows: u64, inserted_rows: u64) -> UpsertCounts {
    UpsertCounts {
        policy_rows,
        inserted_rows,
    }
}

// =============================================================================
// Scenario
// =============================================================================

#[tokio::test]
async fn test_scenario_insert_or_ignore() {
    let db = setup_seeded().await;
    let result = db
        .engine
        .insert_or_ignore(&records_table(), &scenario_batch(), UpsertOptions::new())
        .await
        .unwrap();
    assert_eq!(<(u64, u64)>::from(result), (2, 1));

    let mut expected = seed_rows();
    expected.push(RecordRow::new(5, "E", "2025-01-01 00:00:00", "2025-01-01 00:00:00"));
    assert_eq!(db.records().await, expected);
    db.assert_no_staging_tables().await;
}

#[tokio::test]
async fn test_scenario_insert_or_replace() {
    let db = setup_seeded().await;
    let result = db
        .engine
        .insert_or_replace(&records_table(), &scenario_batch(), UpsertOptions::new())
        .await
        .unwrap();
    assert_eq!(result, counts(2, 1));

    let mut expected = seed_rows()[..2].to_vec();
    expected.push(RecordRow::new(3, "C2", "2025-01-01 00:00:00", "2025-01-01 00:00:00"));
    expected.push(RecordRow::new(4, "D2", "2025-01-01 00:00:00", "2025-01-01 00:00:00"));
    expected.push(RecordRow::new(5, "E", "2025-01-01 00:00:00", "2025-01-01 00:00:00"));
    assert_eq!(db.records().await, expected);
    db.assert_no_staging_tables().await;
}

#[tokio::test]
async fn test_scenario_insert_or_merge() {
    let db = setup_seeded().await;
    let result = db
        .engine
        .insert_or_merge(
            &records_table(),
            &scenario_batch(),
            &["description", "update_at"],
            UpsertOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(result, counts(2, 1));

    let mut expected = seed_rows()[..2].to_vec();
    expected.push(RecordRow::new(3, "C2", "2023-01-03 00:00:00", "2025-01-01 00:00:00"));
    expected.push(RecordRow::new(4, "D2", "2023-01-04 00:00:00", "2025-01-01 00:00:00"));
    expected.push(RecordRow::new(5, "E", "2025-01-01 00:00:00", "2025-01-01 00:00:00"));
    assert_eq!(db.records().await, expected);
    db.assert_no_staging_tables().await;
}

// =============================================================================
// Properties
// =============================================================================

fn fresh_batch() -> Vec<Record> {
    (10..15)
        .map(|id| record(id, "new", "2025-02-01 00:00:00", "2025-02-01 12:30:00"))
        .collect()
}

fn fresh_rows() -> Vec<RecordRow> {
    (10..15)
        .map(|id| RecordRow::new(id, "new", "2025-02-01 00:00:00", "2025-02-01 12:30:00"))
        .collect()
}

#[tokio::test]
async fn test_empty_target_inserts_whole_batch_for_every_policy() {
    for policy in ["ignore", "replace", "merge"] {
        let db = setup().await;
        let table = records_table();
        let batch = fresh_batch();
        let result = match policy {
            "ignore" => db.engine.insert_or_ignore(&table, &batch, UpsertOptions::new()).await,
            "replace" => db.engine.insert_or_replace(&table, &batch, UpsertOptions::new()).await,
            _ => {
                db.engine
                    .insert_or_merge(&table, &batch, &["description"], UpsertOptions::new())
                    .await
            }
        }
        .unwrap();

        assert_eq!(result, counts(0, 5), "{}", policy);
        assert_eq!(db.records().await, fresh_rows(), "{}", policy);
        db.assert_no_staging_tables().await;
    }
}

#[tokio::test]
async fn test_all_keys_colliding_inserts_nothing_for_every_policy() {
    let batch: Vec<Record> = (1..=4)
        .map(|id| record(id, "Z", "2030-01-01 00:00:00", "2030-01-01 00:00:00"))
        .collect();

    for policy in ["ignore", "replace", "merge"] {
        let db = setup_seeded().await;
        let table = records_table();
        let result = match policy {
            "ignore" => db.engine.insert_or_ignore(&table, &batch, UpsertOptions::new()).await,
            "replace" => db.engine.insert_or_replace(&table, &batch, UpsertOptions::new()).await,
            _ => {
                db.engine
                    .insert_or_merge(&table, &batch, &["update_at"], UpsertOptions::new())
                    .await
            }
        }
        .unwrap();

        assert_eq!(result, counts(4, 0), "{}", policy);
        assert_eq!(db.records().await.len(), 4, "{}", policy);
    }
}

#[tokio::test]
async fn test_insert_or_ignore_is_idempotent() {
    let db = setup_seeded().await;
    let table = records_table();

    let first = db
        .engine
        .insert_or_ignore(&table, &scenario_batch(), UpsertOptions::new())
        .await
        .unwrap();
    let after_first = db.records().await;

    let second = db
        .engine
        .insert_or_ignore(&table, &scenario_batch(), UpsertOptions::new())
        .await
        .unwrap();

    assert_eq!(first, counts(2, 1));
    assert_eq!(second, counts(3, 0));
    assert_eq!(db.records().await, after_first);
}

#[tokio::test]
async fn test_merge_inserts_full_row_for_new_keys() {
    let db = setup_seeded().await;
    let batch = vec![record(7, "G", "2025-03-01 00:00:00", "2025-03-02 00:00:00")];
    db.engine
        .insert_or_merge(&records_table(), &batch, &["update_at"], UpsertOptions::new())
        .await
        .unwrap();

    assert_eq!(
        db.record(7).await.unwrap(),
        RecordRow::new(7, "G", "2025-03-01 00:00:00", "2025-03-02 00:00:00")
    );
}

#[tokio::test]
async fn test_merge_with_empty_columns_fails_before_touching_target() {
    let db = setup_seeded().await;
    let err = db
        .engine
        .insert_or_merge(&records_table(), &scenario_batch(), &[], UpsertOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpsertError::Configuration(_)));
    assert_eq!(db.records().await, seed_rows());
    db.assert_no_staging_tables().await;

    // Also on an empty batch
    let err = db
        .engine
        .insert_or_merge(&records_table(), &[], &[], UpsertOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::Configuration(_)));
}

#[tokio::test]
async fn test_merge_rejects_primary_key_and_unknown_columns() {
    let db = setup_seeded().await;
    for columns in [&["id"][..], &["nope"][..]] {
        let err = db
            .engine
            .insert_or_merge(&records_table(), &scenario_batch(), columns, UpsertOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpsertError::Configuration(_)), "{:?}", columns);
    }
    assert_eq!(db.records().await, seed_rows());
}

// =============================================================================
// Batch handling
// =============================================================================

#[tokio::test]
async fn test_empty_batch_returns_zero_counts() {
    let db = setup_seeded().await;
    let result = db
        .engine
        .insert_or_replace(&records_table(), &[], UpsertOptions::new())
        .await
        .unwrap();
    assert_eq!(result, UpsertCounts::default());
    assert_eq!(db.records().await, seed_rows());
}

#[tokio::test]
async fn test_duplicate_keys_last_occurrence_wins() {
    let db = setup_seeded().await;
    let batch = vec![
        record(5, "first", "2025-01-01 00:00:00", "2025-01-01 00:00:00"),
        record(3, "C-first", "2025-01-01 00:00:00", "2025-01-01 00:00:00"),
        record(5, "last", "2025-01-02 00:00:00", "2025-01-02 00:00:00"),
        record(3, "C-last", "2025-01-02 00:00:00", "2025-01-02 00:00:00"),
    ];
    let result = db
        .engine
        .insert_or_replace(&records_table(), &batch, UpsertOptions::new())
        .await
        .unwrap();

    assert_eq!(result, counts(1, 1));
    assert_eq!(db.record(3).await.unwrap().description.as_deref(), Some("C-last"));
    assert_eq!(db.record(5).await.unwrap().description.as_deref(), Some("last"));
}

#[tokio::test]
async fn test_missing_primary_key_is_configuration_error() {
    let db = setup_seeded().await;
    let batch = vec![Record::new()
        .with("description", "x")
        .with("create_at", ts("2025-01-01 00:00:00"))
        .with("update_at", ts("2025-01-01 00:00:00"))];
    let err = db
        .engine
        .insert_or_ignore(&records_table(), &batch, UpsertOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::Configuration(_)));
    db.assert_no_staging_tables().await;
}

#[tokio::test]
async fn test_table_without_primary_key_is_configuration_error() {
    let db = setup_seeded().await;
    let mut table = records_table();
    table.primary_key.clear();
    let err = db
        .engine
        .insert_or_ignore(&table, &scenario_batch(), UpsertOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::Configuration(_)));
}

#[tokio::test]
async fn test_chunked_load_is_invisible_to_caller() {
    let db = setup_seeded().await;
    let mut config = db.config();
    config.load.max_rows_per_statement = 2;
    let engine = db.engine_with(config);

    let mut batch = scenario_batch();
    batch.extend(fresh_batch());
    let result = engine
        .insert_or_ignore(&records_table(), &batch, UpsertOptions::new())
        .await
        .unwrap();

    assert_eq!(result, counts(2, 6));
    assert_eq!(db.records().await.len(), 10);
}

#[tokio::test]
async fn test_omitted_column_takes_staging_default() {
    let db = setup().await;
    db.execute(
        "CREATE TABLE tags (name TEXT NOT NULL PRIMARY KEY, label TEXT NOT NULL DEFAULT 'n/a', hits INTEGER)",
    )
    .await;
    let table = Table::new("tags")
        .column(Column::new("name", "TEXT").not_null())
        .column(Column::new("label", "TEXT").not_null().default_expr("'n/a'"))
        .column(Column::new("hits", "INTEGER"))
        .primary_key(["name"]);

    let batch = vec![Record::new().with("name", "rust").with("hits", 3)];
    db.engine
        .insert_or_ignore(&table, &batch, UpsertOptions::new())
        .await
        .unwrap();

    let (label, hits): (String, i64) = sqlx::query_as("SELECT label, hits FROM tags WHERE name = 'rust'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(label, "n/a");
    assert_eq!(hits, 3);
}

#[tokio::test]
async fn test_composite_primary_key() {
    let db = setup().await;
    db.execute("CREATE TABLE pairs (a INTEGER NOT NULL, b TEXT NOT NULL, v INTEGER, PRIMARY KEY (a, b))")
        .await;
    db.execute("INSERT INTO pairs VALUES (1, 'x', 10), (1, 'y', 20)").await;

    let table = Table::new("pairs")
        .column(Column::new("a", "INTEGER").not_null())
        .column(Column::new("b", "TEXT").not_null())
        .column(Column::new("v", "INTEGER"))
        .primary_key(["a", "b"]);
    let batch = vec![
        Record::new().with("a", 1).with("b", "y").with("v", 21),
        Record::new().with("a", 2).with("b", "x").with("v", 30),
    ];

    let result = db
        .engine
        .insert_or_merge(&table, &batch, &["v"], UpsertOptions::new())
        .await
        .unwrap();
    assert_eq!(result, counts(1, 1));

    let rows: Vec<(i64, String, i64)> = sqlx::query_as("SELECT a, b, v FROM pairs ORDER BY a, b")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            (1, "x".to_string(), 10),
            (1, "y".to_string(), 21),
            (2, "x".to_string(), 30)
        ]
    );
}

// =============================================================================
// Self-managed failures
// =============================================================================

fn forbidden_batch(id: i64) -> Vec<Record> {
    let mut batch = scenario_batch();
    batch.push(record(id, FORBIDDEN, "2025-01-01 00:00:00", "2025-01-01 00:00:00"));
    batch
}

#[tokio::test]
async fn test_policy_failure_rolls_back_every_policy() {
    let db = setup_seeded().await;
    let table = records_table();

    // new key -> insert fails (ignore, replace, merge)
    let err = db
        .engine
        .insert_or_ignore(&table, &forbidden_batch(9), UpsertOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::PolicyExecution { policy: "ignore", .. }), "{}", err);

    // delete of rows 3/4 succeeds, re-insert fails: the delete must be undone
    let err = db
        .engine
        .insert_or_replace(&table, &forbidden_batch(9), UpsertOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::PolicyExecution { policy: "replace", .. }), "{}", err);

    // conflicting key -> update fails
    let err = db
        .engine
        .insert_or_merge(&table, &forbidden_batch(2), &["description"], UpsertOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::PolicyExecution { policy: "merge", .. }), "{}", err);

    assert_eq!(db.records().await, seed_rows());
    db.assert_no_staging_tables().await;
}

#[tokio::test]
async fn test_load_failure_is_load_error() {
    let db = setup_seeded().await;
    let batch = vec![Record::new()
        .with("id", 6)
        .with("description", "F")
        .with("create_at", SqlValue::Null)
        .with("update_at", ts("2025-01-01 00:00:00"))];

    let err = db
        .engine
        .insert_or_ignore(&records_table(), &batch, UpsertOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::Load { .. }), "{}", err);
    assert_eq!(db.records().await, seed_rows());
    db.assert_no_staging_tables().await;
}

#[tokio::test]
async fn test_existing_object_at_staging_name_is_schema_error() {
    let db = setup_seeded().await;
    db.execute("CREATE TABLE temp_taken (keep INTEGER)").await;
    db.execute("INSERT INTO temp_taken VALUES (42)").await;

    let err = db
        .engine
        .insert_or_ignore(
            &records_table(),
            &scenario_batch(),
            UpsertOptions::new().staging_name("temp_taken"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::Schema { .. }), "{}", err);

    // Not ours: must survive
    let kept: i64 = sqlx::query_scalar("SELECT keep FROM temp_taken")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(kept, 42);
    assert_eq!(db.records().await, seed_rows());
}

#[tokio::test]
async fn test_claimed_staging_name_is_schema_error() {
    let db = setup_seeded().await;
    let registry = StagingRegistry::new();
    let _claim = registry.claim("temp_busy").unwrap();

    let err = db
        .engine
        .insert_or_ignore(
            &records_table(),
            &scenario_batch(),
            UpsertOptions::new().registry(&registry).staging_name("temp_busy"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::Schema { .. }));
    assert_eq!(db.records().await, seed_rows());
}

#[tokio::test]
async fn test_registry_is_released_on_every_path() {
    let db = setup_seeded().await;
    let registry = StagingRegistry::new();

    db.engine
        .insert_or_ignore(
            &records_table(),
            &scenario_batch(),
            UpsertOptions::new().registry(&registry).staging_name("temp_ok"),
        )
        .await
        .unwrap();
    assert!(registry.is_empty());

    db.engine
        .insert_or_replace(
            &records_table(),
            &forbidden_batch(9),
            UpsertOptions::new().registry(&registry).staging_name("temp_fail"),
        )
        .await
        .unwrap_err();
    assert!(registry.is_empty());
    assert!(db.engine.registry().is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_overlapping_calls_serialize_on_one_database() {
    let db = setup_seeded().await;
    let table = records_table();

    let bulk: Vec<Record> = (10..60)
        .map(|id| record(id, "bulk", "2025-04-01 00:00:00", "2025-04-01 00:00:00"))
        .collect();
    let edits: Vec<Record> = (3..8)
        .map(|id| record(id, "edited", "2025-04-02 00:00:00", "2025-04-02 00:00:00"))
        .collect();

    for _ in 0..3 {
        let (replaced, merged) = tokio::join!(
            db.engine
                .insert_or_replace(&table, &bulk, UpsertOptions::new()),
            db.engine
                .insert_or_merge(&table, &edits, &["description"], UpsertOptions::new()),
        );
        replaced.unwrap();
        merged.unwrap();
    }

    // 1-4 seeded, 5-7 new from the first merge, 10-59 from the replace
    let rows = db.records().await;
    assert_eq!(rows.len(), 4 + 3 + 50);
    assert_eq!(db.record(3).await.unwrap().description.as_deref(), Some("edited"));
    assert_eq!(db.record(3).await.unwrap().create_at, "2023-01-03 00:00:00");
    db.assert_no_staging_tables().await;
    assert!(db.engine.registry().is_empty());
}

// =============================================================================
// User-managed transactions
// =============================================================================

#[tokio::test]
async fn test_user_managed_success_leaves_transaction_open() {
    let db = setup_seeded().await;
    let mut tx = db.pool().begin().await.unwrap();

    let result = db
        .engine
        .insert_or_replace(
            &records_table(),
            &scenario_batch(),
            UpsertOptions::new().transaction(&mut tx),
        )
        .await
        .unwrap();
    assert_eq!(result, counts(2, 1));

    // The caller can keep working in the same transaction
    sqlx::query("DELETE FROM records WHERE id = 1")
        .execute(&mut *tx)
        .await
        .unwrap();
    let leftovers = inspect::list_tables(&mut tx, db.engine.dialect(), None, "temp")
        .await
        .unwrap();
    assert!(leftovers.is_empty());
    tx.commit().await.unwrap();

    let ids: Vec<i64> = db.records().await.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3, 4, 5]);
    assert_eq!(db.record(3).await.unwrap().description.as_deref(), Some("C2"));
}

#[tokio::test]
async fn test_user_managed_caller_rollback_discards_upsert() {
    let db = setup_seeded().await;
    let mut tx = db.pool().begin().await.unwrap();

    db.engine
        .insert_or_ignore(
            &records_table(),
            &scenario_batch(),
            UpsertOptions::new().transaction(&mut tx),
        )
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(db.records().await, seed_rows());
    db.assert_no_staging_tables().await;
}

#[tokio::test]
async fn test_user_managed_policy_failure_leaves_handle_usable() {
    let db = setup_seeded().await;
    let mut tx = db.pool().begin().await.unwrap();

    let err = db
        .engine
        .insert_or_replace(
            &records_table(),
            &forbidden_batch(9),
            UpsertOptions::new().transaction(&mut tx),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::PolicyExecution { .. }), "{}", err);

    // Cleanup ran on the caller's connection
    let leftovers = inspect::list_tables(&mut tx, db.engine.dialect(), None, "temp")
        .await
        .unwrap();
    assert!(leftovers.is_empty(), "{:?}", leftovers);

    // Engine never rolled back or closed: the caller does
    tx.rollback().await.unwrap();
    assert_eq!(db.records().await, seed_rows());
    db.assert_no_staging_tables().await;
}

#[tokio::test]
async fn test_user_managed_schema_error_keeps_foreign_table() {
    let db = setup_seeded().await;
    db.execute("CREATE TABLE temp_foreign (x INTEGER)").await;
    let mut tx = db.pool().begin().await.unwrap();

    let err = db
        .engine
        .insert_or_ignore(
            &records_table(),
            &scenario_batch(),
            UpsertOptions::new()
                .staging_name("temp_foreign")
                .transaction(&mut tx),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::Schema { .. }));
    tx.rollback().await.unwrap();

    assert_eq!(db.staging_tables().await, vec!["temp_foreign".to_string()]);
}

// =============================================================================
// Introspection
// =============================================================================

#[tokio::test]
async fn test_describe_table_matches_declared_schema() {
    let db = setup().await;
    let mut conn = db.pool().acquire().await.unwrap();
    let described = inspect::describe_table(&mut conn, db.engine.dialect(), None, "records")
        .await
        .unwrap();

    let names: Vec<_> = described.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "description", "create_at", "update_at"]);
    assert_eq!(described.primary_key, vec!["id".to_string()]);
    assert!(!described.find_column("id").unwrap().is_nullable);
    assert!(described.find_column("description").unwrap().is_nullable);
    assert!(!described.find_column("create_at").unwrap().is_nullable);
    assert_eq!(described.find_column("create_at").unwrap().data_type, "TIMESTAMP");
}

#[tokio::test]
async fn test_described_table_drives_upsert() {
    let db = setup_seeded().await;
    let described = {
        let mut conn = db.pool().acquire().await.unwrap();
        inspect::describe_table(&mut conn, db.engine.dialect(), None, "records")
            .await
            .unwrap()
    };

    let result = db
        .engine
        .insert_or_ignore(&described, &scenario_batch(), UpsertOptions::new())
        .await
        .unwrap();
    assert_eq!(result, counts(2, 1));
}

#[tokio::test]
async fn test_describe_missing_table_is_schema_error() {
    let db = setup().await;
    let mut conn = db.pool().acquire().await.unwrap();
    let err = inspect::describe_table(&mut conn, db.engine.dialect(), None, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, UpsertError::Schema { .. }));
    assert!(!inspect::table_exists(&mut conn, db.engine.dialect(), None, "missing")
        .await
        .unwrap());
    assert!(inspect::table_exists(&mut conn, db.engine.dialect(), None, "records")
        .await
        .unwrap());
}
