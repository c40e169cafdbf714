// Core domain types shared between the desktop shell and its clients.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, opaque identifier of a document known to the home database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier. Never reused once assigned.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Handle of a live top-level window, assigned by the window host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// A document row as stored in the home database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocId,
    /// Secondary alias used in URLs, resolved back to `id`.
    pub url_id: Option<String>,
    pub name: String,
    pub workspace_id: i64,
    /// Absolute path of the backing file. Set once, at registration.
    pub external_path: Option<String>,
    /// Set while the document sits in the trash.
    pub removed_at: Option<String>,
}

impl DocumentRecord {
    pub fn is_trashed(&self) -> bool {
        self.removed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub docs: Vec<DocumentRecord>,
}

/// Result of a successful `doc.create` / `doc.import` bridge call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: DocId,
    pub path: PathBuf,
}

/// Raw file contents handed to a window's home view for import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPayload {
    pub file_name: String,
    pub contents: Vec<u8>,
}
