use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    login           TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE orgs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id        INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE workspaces (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id          INTEGER NOT NULL REFERENCES orgs (id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE docs (
    id              TEXT PRIMARY KEY,
    url_id          TEXT NULL UNIQUE,
    name            TEXT NOT NULL,
    workspace_id    INTEGER NOT NULL REFERENCES workspaces (id) ON DELETE CASCADE,
    external_path   TEXT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    removed_at      TEXT NULL
);

CREATE INDEX docs_workspace_idx
    ON docs (workspace_id);
"#;

const MIGRATION_V2_SQL: &str = r#"
CREATE UNIQUE INDEX docs_external_path_idx
    ON docs (external_path)
    WHERE external_path IS NOT NULL;

CREATE TABLE user_config (
    user_id         INTEGER PRIMARY KEY REFERENCES users (id) ON DELETE CASCADE,
    recent_items    TEXT NOT NULL DEFAULT '[]',
    updated_at      TEXT NOT NULL
);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL), (2, MIGRATION_V2_SQL)];

/// The local "home database": users, orgs, workspaces and document records.
#[derive(Debug)]
pub struct HomeDb {
    conn: Connection,
}

impl HomeDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create home database directory `{}`", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open home database at `{}`", path.display()))?;
        Self::from_connection(conn, true)
    }

    /// A private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory home database")?;
        Self::from_connection(conn, false)
    }

    fn from_connection(mut conn: Connection, wal: bool) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("failed to enable foreign keys for home database")?;
        if wal {
            conn.execute_batch("PRAGMA journal_mode = WAL;")
                .context("failed to configure sqlite journal mode for home database")?;
        }

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn schema_version(&self) -> Result<i64> {
        current_schema_version(&self.conn)
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply home database migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use tempfile::TempDir;

    use super::{HomeDb, MIGRATION_V1_SQL};

    const EXPECTED_TABLES: &[&str] =
        &["schema_migrations", "users", "orgs", "workspaces", "docs", "user_config"];

    #[test]
    fn open_creates_schema_and_records_latest_migration() {
        let tmp = TempDir::new().expect("temp dir should be created");
        let db = HomeDb::open(tmp.path().join("home.db")).expect("home db should open");

        for table in EXPECTED_TABLES {
            let exists: i64 = db
                .connection()
                .query_row(
                    "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("table existence query should succeed");

            assert_eq!(exists, 1, "expected `{table}` table to exist");
        }

        assert_eq!(db.schema_version().expect("schema version should be readable"), 2);
    }

    #[test]
    fn opening_twice_is_idempotent_for_all_migrations() {
        let tmp = TempDir::new().expect("temp dir should be created");
        let db_path = tmp.path().join("home.db");
        {
            let first = HomeDb::open(&db_path).expect("first open should succeed");
            assert_eq!(first.schema_version().expect("schema version should be readable"), 2);
        }

        let second = HomeDb::open(&db_path).expect("second open should succeed");
        let migration_rows: i64 = second
            .connection()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("schema migration count query should succeed");
        assert_eq!(migration_rows, 2);
    }

    #[test]
    fn existing_v1_schema_is_migrated_to_v2() {
        let tmp = TempDir::new().expect("temp dir should be created");
        let db_path = tmp.path().join("home.db");
        {
            let conn = Connection::open(&db_path).expect("v1 seed db should open");
            conn.execute_batch(
                "CREATE TABLE schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);",
            )
            .expect("schema_migrations should be created");
            conn.execute_batch(MIGRATION_V1_SQL).expect("v1 schema should be applied");
            conn.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (1, datetime('now'))",
                [],
            )
            .expect("v1 migration row should be inserted");
        }

        let db = HomeDb::open(&db_path).expect("home db should upgrade from v1 to v2");
        assert_eq!(db.schema_version().expect("schema version should be readable"), 2);

        let index_exists: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(1) FROM sqlite_master WHERE type = 'index' AND name = 'docs_external_path_idx'",
                [],
                |row| row.get(0),
            )
            .expect("index existence query should succeed");
        assert_eq!(index_exists, 1);
    }

    #[test]
    fn in_memory_database_is_fully_migrated() {
        let db = HomeDb::open_in_memory().expect("in-memory db should open");
        assert_eq!(db.schema_version().unwrap(), 2);
    }
}
