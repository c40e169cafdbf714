// New documents: registration, and one-shot import of uploaded data through
// the embedded server.

pub mod http_server;

use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use gristdesk_common::types::{DocId, NewDocument};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{DesktopError, DesktopResult};
use crate::registry::path_registry::PathRegistry;

/// Whose authority a server call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionContext {
    /// Privileged, session-less context of the desktop shell itself.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Create the document if needed and skip the starter tables.
    NewSkipStarter,
}

/// An open document on the embedded server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocHandle {
    pub doc_id: DocId,
    pub handle: String,
}

/// The embedded application server, as far as document lifecycle goes.
#[async_trait]
pub trait DocServer: Send + Sync {
    async fn open_doc(&self, session: SessionContext, doc_id: &DocId, mode: OpenMode) -> Result<DocHandle>;

    async fn wait_plugins_ready(&self, handle: &DocHandle) -> Result<()>;

    /// Move upload `upload_id` into the document and run the import.
    async fn import_upload(&self, handle: &DocHandle, upload_id: i64) -> Result<()>;
}

#[derive(Clone)]
pub struct DocumentLifecycle {
    server: Arc<dyn DocServer>,
}

impl DocumentLifecycle {
    pub fn new(server: Arc<dyn DocServer>) -> Self {
        Self { server }
    }

    /// Register a new document at `path` and, with `import_upload_id`, fill
    /// it from that upload. `None` when no path was chosen.
    ///
    /// If the import fails the registration is rolled back.
    pub async fn create_document(
        &self,
        paths: &mut PathRegistry,
        path: Option<&Path>,
        import_upload_id: Option<i64>,
    ) -> DesktopResult<Option<NewDocument>> {
        let Some(doc) = self.register(paths, path)? else {
            return Ok(None);
        };
        match import_upload_id {
            None => Ok(Some(doc)),
            Some(upload_id) => {
                let result = self.import_task(doc.id.clone(), upload_id).await;
                Self::finish_import(paths, doc, result).map(Some)
            }
        }
    }

    /// First half of `create_document`: validate the location and register it.
    pub fn register(&self, paths: &mut PathRegistry, path: Option<&Path>) -> DesktopResult<Option<NewDocument>> {
        let Some(path) = path else {
            info!("document creation cancelled");
            return Ok(None);
        };
        let path = canonical_target(path)?;
        ensure_creatable(&path)?;

        let id = paths.register_doc(&path)?;
        Ok(Some(NewDocument { id, path }))
    }

    /// Server-side import of `upload_id` into a freshly registered document.
    /// Does not touch the registries, so it can run off the dispatch loop.
    pub fn import_task(&self, doc_id: DocId, upload_id: i64) -> impl Future<Output = Result<()>> + Send + 'static {
        let server = self.server.clone();
        async move {
            let handle = server.open_doc(SessionContext::System, &doc_id, OpenMode::NewSkipStarter).await?;
            server.wait_plugins_ready(&handle).await?;
            server.import_upload(&handle, upload_id).await?;
            info!(doc_id = %doc_id, upload_id, "imported upload into new document");
            Ok(())
        }
    }

    /// Second half: keep the registration on success, roll it back otherwise.
    pub fn finish_import(paths: &mut PathRegistry, doc: NewDocument, result: Result<()>) -> DesktopResult<NewDocument> {
        match result {
            Ok(()) => Ok(doc),
            Err(import_error) => {
                error!(doc_id = %doc.id, path = %doc.path.display(), error = %format!("{import_error:#}"), "import failed, rolling back");
                if let Err(rollback_error) = paths.forget(&doc.id) {
                    error!(doc_id = %doc.id, error = %rollback_error, "failed to roll back document registration");
                }
                Err(DesktopError::Server(import_error))
            }
        }
    }
}

// Registry key for a file that does not exist yet: the realpath of its
// directory joined with the file name, so it matches what opening the file
// later resolves to.
fn canonical_target(path: &Path) -> DesktopResult<PathBuf> {
    let invalid = |reason: &str| DesktopError::InvalidPath { path: path.to_path_buf(), reason: reason.to_string() };
    if !path.is_absolute() {
        return Err(invalid("path must be absolute"));
    }
    let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Err(invalid("path does not name a file"));
    };
    let parent = parent.canonicalize().map_err(|_| DesktopError::PathNotWritable { path: path.to_path_buf() })?;
    Ok(parent.join(file_name))
}

// The file must not exist yet and its directory must accept new files.
fn ensure_creatable(path: &Path) -> DesktopResult<()> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(scratch) => {
            drop(scratch);
            fs::remove_file(path).map_err(|_| DesktopError::PathNotWritable { path: path.to_path_buf() })
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            Err(DesktopError::PathAlreadyExists { path: path.to_path_buf() })
        }
        Err(_) => Err(DesktopError::PathNotWritable { path: path.to_path_buf() }),
    }
}
