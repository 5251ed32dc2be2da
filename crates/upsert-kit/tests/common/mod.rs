//! Shared fixtures: a temporary SQLite database holding a `records` table.

#![allow(dead_code)]

use chrono::NaiveDateTime;
use sqlx::{AnyPool, Row};
use tempfile::TempDir;
use upsert_kit::{inspect, Column, Record, Table, UpsertConfig, UpsertEngine};

/// Rows the scenario seeds the target with.
pub const SEED_SQL: &str = "INSERT INTO records (id, description, create_at, update_at) VALUES \
    (1, 'A', '2023-01-01 00:00:00', '2024-01-01 00:00:00'), \
    (2, 'B', '2023-01-02 00:00:00', '2024-01-01 00:00:00'), \
    (3, 'C', '2023-01-03 00:00:00', '2024-01-01 00:00:00'), \
    (4, 'D', '2023-01-04 00:00:00', '2024-01-01 00:00:00')";

/// The CHECK exists on the target only, so a forbidden description loads into
/// staging fine and fails once a policy statement writes it to the target.
const CREATE_RECORDS_SQL: &str = "CREATE TABLE records (\
    id INTEGER NOT NULL PRIMARY KEY, \
    description TEXT CHECK (description IS NULL OR description <> 'forbidden'), \
    create_at TIMESTAMP NOT NULL, \
    update_at TIMESTAMP NOT NULL)";

pub const FORBIDDEN: &str = "forbidden";

pub struct TestDb {
    // Keeps the database file alive
    _dir: TempDir,
    pub engine: UpsertEngine,
}

impl TestDb {
    pub fn pool(&self) -> &AnyPool {
        self.engine.pool()
    }

    /// Engine sharing this database with a different configuration.
    pub fn engine_with(&self, config: UpsertConfig) -> UpsertEngine {
        UpsertEngine::from_pool(self.pool().clone(), self.engine.dialect().clone(), config)
    }

    pub fn config(&self) -> UpsertConfig {
        self.engine.config().clone()
    }

    pub async fn execute(&self, sql: &str) {
        sqlx::query(sql).execute(self.pool()).await.unwrap();
    }

    pub async fn seed(&self) {
        self.execute(SEED_SQL).await;
    }

    /// Tables whose name starts with the staging prefix.
    pub async fn staging_tables(&self) -> Vec<String> {
        let mut conn = self.pool().acquire().await.unwrap();
        inspect::list_tables(&mut conn, self.engine.dialect(), None, "temp")
            .await
            .unwrap()
    }

    pub async fn assert_no_staging_tables(&self) {
        let leftovers = self.staging_tables().await;
        assert!(leftovers.is_empty(), "staging tables left behind: {:?}", leftovers);
    }

    pub async fn records(&self) -> Vec<RecordRow> {
        sqlx::query(
            "SELECT id, description, CAST(create_at AS TEXT), CAST(update_at AS TEXT) \
             FROM records ORDER BY id",
        )
        .fetch_all(self.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| RecordRow {
            id: row.get(0),
            description: row.get(1),
            create_at: row.get(2),
            update_at: row.get(3),
        })
        .collect()
    }

    pub async fn record(&self, id: i64) -> Option<RecordRow> {
        self.records().await.into_iter().find(|r| r.id == id)
    }
}

/// A `records` row as read back from SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    pub id: i64,
    pub description: Option<String>,
    pub create_at: String,
    pub update_at: String,
}

impl RecordRow {
    pub fn new(id: i64, description: &str, create_at: &str, update_at: &str) -> Self {
        Self {
            id,
            description: Some(description.to_string()),
            create_at: create_at.to_string(),
            update_at: update_at.to_string(),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh database with an empty `records` table.
pub async fn setup() -> TestDb {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("upsert.db").display());
    let mut config = UpsertConfig::new(url);
    config.database.max_connections = 2;
    config.database.acquire_timeout_secs = 5;

    let engine = UpsertEngine::connect(&config).await.unwrap();
    let db = TestDb { _dir: dir, engine };
    db.execute(CREATE_RECORDS_SQL).await;
    db
}

/// Fresh database with the four seed rows.
pub async fn setup_seeded() -> TestDb {
    let db = setup().await;
    db.seed().await;
    db
}

pub fn records_table() -> Table {
    Table::new("records")
        .column(Column::new("id", "INTEGER").not_null())
        .column(Column::new("description", "TEXT"))
        .column(Column::new("create_at", "TIMESTAMP").not_null())
        .column(Column::new("update_at", "TIMESTAMP").not_null())
        .primary_key(["id"])
}

pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn record(id: i64, description: &str, create_at: &str, update_at: &str) -> Record {
    Record::new()
        .with("id", id)
        .with("description", description)
        .with("create_at", ts(create_at))
        .with("update_at", ts(update_at))
}

/// Rows 1-4 as seeded.
pub fn seed_rows() -> Vec<RecordRow> {
    vec![
        RecordRow::new(1, "A", "2023-01-01 00:00:00", "2024-01-01 00:00:00"),
        RecordRow::new(2, "B", "2023-01-02 00:00:00", "2024-01-01 00:00:00"),
        RecordRow::new(3, "C", "2023-01-03 00:00:00", "2024-01-01 00:00:00"),
        RecordRow::new(4, "D", "2023-01-04 00:00:00", "2024-01-01 00:00:00"),
    ]
}

/// Batch of the scenario: rows 3 and 4 collide, row 5 is new.
pub fn scenario_batch() -> Vec<Record> {
    vec![
        record(3, "C2", "2025-01-01 00:00:00", "2025-01-01 00:00:00"),
        record(4, "D2", "2025-01-01 00:00:00", "2025-01-01 00:00:00"),
        record(5, "E", "2025-01-01 00:00:00", "2025-01-01 00:00:00"),
    ]
}
