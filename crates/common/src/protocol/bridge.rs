// Parameter and result shapes for the window bridge and the instance socket.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::DocId;

// ── Window -> app ──────────────────────────────────────────────────

/// `doc.create`: the save location chosen in the window's dialog. `None`
/// means the dialog was cancelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocParams {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `doc.import`: create a document at `path` and fill it from a finished upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportDocParams {
    pub upload_id: i64,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `window.navigated` and `window.openUrl`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UrlParams {
    pub url: String,
}

/// `menu.fileOpen` and `menu.openRecent`: a file picked in the window's menu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathParams {
    pub path: PathBuf,
}

// ── Instance socket ────────────────────────────────────────────────

/// `app.open`: argv and working directory of a second process instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppOpenParams {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoragePathParams {
    pub doc_id: DocId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoragePathResult {
    pub path: PathBuf,
}

// ── App -> window ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportPayloadPush {
    pub file_name: String,
    /// File contents, standard base64.
    pub contents_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPush {
    pub title: String,
    pub message: String,
}
