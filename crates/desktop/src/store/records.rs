// Document, user and workspace records in the home database.
//
// Everything lives under the single local default user: one personal org with
// a "Home" workspace, created on first start.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use gristdesk_common::types::{DocId, DocumentRecord, User, Workspace};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use thiserror::Error;

use super::home_db::HomeDb;

pub const DEFAULT_ORG_NAME: &str = "Personal";
pub const DEFAULT_WORKSPACE_NAME: &str = "Home";

/// Raised by `add_document` when another record already holds the path.
#[derive(Debug, Error)]
#[error("a document record already claims `{path}`")]
pub struct PathClaimed {
    pub path: String,
}

/// The slice of the home database the desktop shell needs.
pub trait RecordStore: Send + Sync {
    fn get_all_docs(&self) -> Result<Vec<DocumentRecord>>;

    /// Documents in any workspace of any org `owner` owns.
    fn get_owned_docs(&self, owner: &User) -> Result<Vec<DocumentRecord>>;

    /// Insert a new live document. Fails with a [`PathClaimed`] error in the
    /// chain if `external_path` is already recorded.
    fn add_document(
        &self,
        owner: &User,
        workspace_id: i64,
        name: &str,
        external_path: &str,
    ) -> Result<DocumentRecord>;

    /// Hard-delete a document owned by `user_id`. Returns whether a row went away.
    fn delete_document(&self, user_id: i64, id: &DocId) -> Result<bool>;

    /// Bring a soft-deleted document back from the trash.
    fn undelete_document(&self, user_id: i64, id: &DocId) -> Result<bool>;

    /// Workspaces (with their documents) of the owner's `org_index`-th org.
    fn get_org_workspaces(&self, owner: &User, org_index: usize) -> Result<Vec<Workspace>>;

    fn get_user_by_login(&self, email: &str) -> Result<Option<User>>;

    /// Find a document by its id or by its URL alias.
    fn find_doc(&self, id_or_url_id: &str) -> Result<Option<DocumentRecord>>;

    /// Return the user with this login, creating it together with its personal
    /// org and home workspace when missing.
    fn ensure_default_user(&self, email: &str, name: &str) -> Result<User>;

    fn get_recent_items(&self, user_id: i64) -> Result<Vec<String>>;

    fn set_recent_items(&self, user_id: i64, items: &[String]) -> Result<()>;
}

/// [`RecordStore`] over the SQLite home database.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db: Arc<Mutex<HomeDb>>,
}

impl SqliteRecordStore {
    pub fn new(db: HomeDb) -> Self {
        Self { db: Arc::new(Mutex::new(db)) }
    }

    /// Give a document a URL alias.
    pub fn assign_url_id(&self, id: &DocId, url_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE docs SET url_id = ?1, updated_at = ?2 WHERE id = ?3",
                    params![url_id, now(), id.as_str()],
                )
                .context("failed to assign url_id")?;
            Ok(changed > 0)
        })
    }

    /// Move a document to the trash.
    pub fn soft_delete_document(&self, user_id: i64, id: &DocId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    &format!("UPDATE docs SET removed_at = ?1 WHERE id = ?2 AND {}", owned_by(3)),
                    params![now(), id.as_str(), user_id],
                )
                .context("failed to soft-delete docs row")?;
            Ok(changed > 0)
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut db = self.db.lock().map_err(|_| anyhow!("home database lock poisoned"))?;
        f(db.connection_mut())
    }
}

// Restricts a `docs` statement to rows in workspaces of orgs owned by the
// user bound at parameter `?{param}`.
fn owned_by(param: usize) -> String {
    format!(
        "workspace_id IN (SELECT w.id FROM workspaces w JOIN orgs o ON o.id = w.org_id \
         WHERE o.owner_id = ?{param})"
    )
}

const DOC_COLUMNS: &str = "id, url_id, name, workspace_id, external_path, removed_at";

impl RecordStore for SqliteRecordStore {
    fn get_all_docs(&self) -> Result<Vec<DocumentRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {DOC_COLUMNS} FROM docs ORDER BY created_at ASC, id ASC"))
                .context("failed to prepare all docs query")?;
            let rows = stmt.query_map([], row_to_doc).context("failed to query docs")?;
            rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect docs rows")
        })
    }

    fn get_owned_docs(&self, owner: &User) -> Result<Vec<DocumentRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {DOC_COLUMNS} FROM docs WHERE {} ORDER BY created_at ASC, id ASC",
                    owned_by(1)
                ))
                .context("failed to prepare owned docs query")?;
            let rows = stmt.query_map(params![owner.id], row_to_doc).context("failed to query owned docs")?;
            rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect owned docs rows")
        })
    }

    fn add_document(
        &self,
        owner: &User,
        workspace_id: i64,
        name: &str,
        external_path: &str,
    ) -> Result<DocumentRecord> {
        self.with_conn(|conn| {
            let owned: Option<i64> = conn
                .query_row(
                    "SELECT w.id FROM workspaces w JOIN orgs o ON o.id = w.org_id \
                     WHERE w.id = ?1 AND o.owner_id = ?2",
                    params![workspace_id, owner.id],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to check workspace ownership")?;
            if owned.is_none() {
                return Err(anyhow!(
                    "workspace {workspace_id} does not belong to user `{}`",
                    owner.login
                ));
            }

            let record = DocumentRecord {
                id: DocId::generate(),
                url_id: None,
                name: name.to_string(),
                workspace_id,
                external_path: Some(external_path.to_string()),
                removed_at: None,
            };
            let timestamp = now();
            let inserted = conn.execute(
                "INSERT INTO docs \
                 (id, url_id, name, workspace_id, external_path, created_at, updated_at, removed_at) \
                 VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?5, NULL)",
                params![record.id.as_str(), record.name, workspace_id, external_path, timestamp],
            );
            match inserted {
                Ok(_) => Ok(record),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(anyhow::Error::new(PathClaimed { path: external_path.to_string() }))
                }
                Err(err) => Err(err).context("failed to insert docs row"),
            }
        })
    }

    fn delete_document(&self, user_id: i64, id: &DocId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    &format!("DELETE FROM docs WHERE id = ?1 AND {}", owned_by(2)),
                    params![id.as_str(), user_id],
                )
                .context("failed to delete docs row")?;
            Ok(changed > 0)
        })
    }

    fn undelete_document(&self, user_id: i64, id: &DocId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    &format!(
                        "UPDATE docs SET removed_at = NULL, updated_at = ?1 \
                         WHERE id = ?2 AND removed_at IS NOT NULL AND {}",
                        owned_by(3)
                    ),
                    params![now(), id.as_str(), user_id],
                )
                .context("failed to undelete docs row")?;
            Ok(changed > 0)
        })
    }

    fn get_org_workspaces(&self, owner: &User, org_index: usize) -> Result<Vec<Workspace>> {
        self.with_conn(|conn| {
            let org_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM orgs WHERE owner_id = ?1 ORDER BY id ASC LIMIT 1 OFFSET ?2",
                    params![owner.id, org_index as i64],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to query orgs")?;
            let Some(org_id) = org_id else {
                return Err(anyhow!("user `{}` has no org #{org_index}", owner.login));
            };

            let mut ws_stmt = conn
                .prepare("SELECT id, org_id, name FROM workspaces WHERE org_id = ?1 ORDER BY id ASC")
                .context("failed to prepare workspaces query")?;
            let workspaces = ws_stmt
                .query_map(params![org_id], |row| {
                    Ok(Workspace { id: row.get(0)?, org_id: row.get(1)?, name: row.get(2)?, docs: Vec::new() })
                })
                .context("failed to query workspaces")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to collect workspaces rows")?;

            let mut doc_stmt = conn
                .prepare(&format!(
                    "SELECT {DOC_COLUMNS} FROM docs WHERE workspace_id = ?1 ORDER BY created_at ASC, id ASC"
                ))
                .context("failed to prepare workspace docs query")?;
            workspaces
                .into_iter()
                .map(|mut workspace| {
                    workspace.docs = doc_stmt
                        .query_map(params![workspace.id], row_to_doc)
                        .context("failed to query workspace docs")?
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .context("failed to collect workspace docs rows")?;
                    Ok(workspace)
                })
                .collect()
        })
    }

    fn get_user_by_login(&self, email: &str) -> Result<Option<User>> {
        self.with_conn(|conn| user_by_login(conn, email))
    }

    fn find_doc(&self, id_or_url_id: &str) -> Result<Option<DocumentRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {DOC_COLUMNS} FROM docs WHERE id = ?1 OR url_id = ?1 \
                     ORDER BY (id = ?1) DESC LIMIT 1"
                ),
                params![id_or_url_id],
                row_to_doc,
            )
            .optional()
            .context("failed to query docs by id or url_id")
        })
    }

    fn ensure_default_user(&self, email: &str, name: &str) -> Result<User> {
        self.with_conn(|conn| {
            if let Some(user) = user_by_login(conn, email)? {
                return Ok(user);
            }

            let tx = conn.transaction().context("failed to start default user transaction")?;
            let timestamp = now();
            tx.execute(
                "INSERT INTO users (login, name, created_at) VALUES (?1, ?2, ?3)",
                params![email, name, timestamp],
            )
            .context("failed to insert default user")?;
            let user_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO orgs (owner_id, name, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, DEFAULT_ORG_NAME, timestamp],
            )
            .context("failed to insert personal org")?;
            let org_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO workspaces (org_id, name, created_at) VALUES (?1, ?2, ?3)",
                params![org_id, DEFAULT_WORKSPACE_NAME, timestamp],
            )
            .context("failed to insert home workspace")?;
            tx.commit().context("failed to commit default user")?;

            Ok(User { id: user_id, login: email.to_string(), name: name.to_string() })
        })
    }

    fn get_recent_items(&self, user_id: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT recent_items FROM user_config WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to query user_config")?;
            match raw {
                Some(raw) => serde_json::from_str(&raw).context("failed to decode recent items"),
                None => Ok(Vec::new()),
            }
        })
    }

    fn set_recent_items(&self, user_id: i64, items: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(items).context("failed to encode recent items")?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_config (user_id, recent_items, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                     recent_items = excluded.recent_items, updated_at = excluded.updated_at",
                params![user_id, encoded, now()],
            )
            .context("failed to upsert user_config row")?;
            Ok(())
        })
    }
}

fn user_by_login(conn: &Connection, email: &str) -> Result<Option<User>> {
    conn.query_row("SELECT id, login, name FROM users WHERE login = ?1", params![email], |row| {
        Ok(User { id: row.get(0)?, login: row.get(1)?, name: row.get(2)? })
    })
    .optional()
    .context("failed to query users by login")
}

fn row_to_doc(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: DocId::new(row.get::<_, String>(0)?),
        url_id: row.get(1)?,
        name: row.get(2)?,
        workspace_id: row.get(3)?,
        external_path: row.get(4)?,
        removed_at: row.get(5)?,
    })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}
