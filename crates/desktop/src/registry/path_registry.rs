// Bidirectional document id <-> file path mapping.
//
// The home database is the source of truth. The two maps are a cache of the
// records whose backing file exists, and are always exact inverses of each
// other between calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use gristdesk_common::file_kind::doc_name_from_path;
use gristdesk_common::types::{DocId, User};
use tracing::{debug, info, warn};

use crate::error::{DesktopError, DesktopResult};
use crate::store::records::{PathClaimed, RecordStore};

/// Outcome of startup reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub admitted: usize,
    pub pruned: usize,
    /// Deletions that matched no row, e.g. removed concurrently.
    pub already_gone: usize,
    pub prune_failures: usize,
}

pub struct PathRegistry {
    store: Arc<dyn RecordStore>,
    default_email: String,
    id_to_path: HashMap<DocId, PathBuf>,
    path_to_id: HashMap<PathBuf, DocId>,
}

impl PathRegistry {
    /// Load the default user's document records and reconcile them against
    /// the filesystem.
    ///
    /// Records whose backing file exists are admitted into the cache. Records
    /// without a path, or whose file is gone, are deleted from the store; a
    /// failed deletion is logged and skipped. Records in workspaces the default
    /// user does not own are left alone.
    pub fn initialize(
        store: Arc<dyn RecordStore>,
        default_email: impl Into<String>,
    ) -> DesktopResult<(Self, ReconcileReport)> {
        let mut registry = Self {
            store,
            default_email: default_email.into(),
            id_to_path: HashMap::new(),
            path_to_id: HashMap::new(),
        };
        let owner = registry.default_user()?;
        let records = registry
            .store
            .get_owned_docs(&owner)
            .context("failed to load document records")
            .map_err(DesktopError::Store)?;

        let mut report = ReconcileReport::default();
        for record in records {
            let existing = record.external_path.as_deref().map(PathBuf::from).filter(|path| path.is_file());
            match existing {
                Some(path) => {
                    registry.insert(record.id, path);
                    report.admitted += 1;
                }
                None => match registry.store.delete_document(owner.id, &record.id) {
                    Ok(true) => {
                        debug!(
                            doc_id = %record.id,
                            path = record.external_path.as_deref().unwrap_or(""),
                            "pruned document record with missing file"
                        );
                        report.pruned += 1;
                    }
                    Ok(false) => {
                        debug!(doc_id = %record.id, "orphaned document record was already gone");
                        report.already_gone += 1;
                    }
                    Err(error) => {
                        warn!(doc_id = %record.id, error = %format!("{error:#}"), "failed to prune orphaned document record");
                        report.prune_failures += 1;
                    }
                },
            }
        }

        info!(
            admitted = report.admitted,
            pruned = report.pruned,
            already_gone = report.already_gone,
            prune_failures = report.prune_failures,
            "document registry reconciled"
        );
        Ok((registry, report))
    }

    pub fn lookup_by_id(&self, id: &DocId) -> Option<&Path> {
        self.id_to_path.get(id).map(PathBuf::as_path)
    }

    /// Exact cache lookup; `path` must already be normalized.
    pub fn lookup_by_path(&self, path: &Path) -> Option<&DocId> {
        self.path_to_id.get(path)
    }

    /// Existing id for `path`, or a freshly registered one.
    pub fn lookup_by_path_or_create(&mut self, path: &Path) -> DesktopResult<DocId> {
        if let Some(id) = self.lookup_by_path(path) {
            debug!(doc_id = %id, path = %path.display(), "known document");
            return Ok(id.clone());
        }
        let id = self.register_doc(path)?;
        debug!(doc_id = %id, path = %path.display(), "document not in home database, assigned new id");
        Ok(id)
    }

    /// Create a record for a path the cache does not know, and cache it.
    ///
    /// Fails with [`DesktopError::RegistryInconsistency`] if the store already
    /// has a record for the path.
    pub fn register_doc(&mut self, path: &Path) -> DesktopResult<DocId> {
        let external_path = path_to_string(path)?;
        if self.path_to_id.contains_key(path) {
            return Err(DesktopError::RegistryInconsistency { path: path.to_path_buf() });
        }

        let owner = self.default_user()?;
        let workspaces = self
            .store
            .get_org_workspaces(&owner, 0)
            .context("failed to list home workspaces")
            .map_err(DesktopError::Store)?;
        let workspace = workspaces
            .first()
            .ok_or_else(|| DesktopError::Store(anyhow::anyhow!("user `{}` has no workspace", owner.login)))?;
        if workspace.docs.iter().any(|doc| doc.external_path.as_deref() == Some(external_path.as_str())) {
            return Err(DesktopError::RegistryInconsistency { path: path.to_path_buf() });
        }

        let name = doc_name_from_path(path);
        let record = match self.store.add_document(&owner, workspace.id, &name, &external_path) {
            Ok(record) => record,
            Err(error) if error.downcast_ref::<PathClaimed>().is_some() => {
                return Err(DesktopError::RegistryInconsistency { path: path.to_path_buf() });
            }
            Err(error) => return Err(DesktopError::Store(error)),
        };

        info!(doc_id = %record.id, path = %path.display(), "registered document");
        self.insert(record.id.clone(), path.to_path_buf());
        Ok(record.id)
    }

    /// Drop a document from the cache and the store.
    pub fn forget(&mut self, id: &DocId) -> DesktopResult<()> {
        if let Some(path) = self.id_to_path.remove(id) {
            self.path_to_id.remove(&path);
        }
        let owner = self.default_user()?;
        self.store.delete_document(owner.id, id).map_err(DesktopError::Store)?;
        info!(doc_id = %id, "forgot document");
        Ok(())
    }

    /// Where the embedded server should keep `id`: its registered file, or
    /// `<docs_root>/<id>.grist` when the cache has no entry.
    pub fn storage_path(&self, id: &DocId, docs_root: &Path) -> PathBuf {
        match self.lookup_by_id(id) {
            Some(path) => path.to_path_buf(),
            None => {
                debug!(doc_id = %id, "no registered path, using default storage location");
                docs_root.join(format!("{id}.grist"))
            }
        }
    }

    /// Restore a document from the trash. Returns whether it was trashed.
    pub fn undelete(&self, id: &DocId) -> DesktopResult<bool> {
        let Some(record) = self.store.find_doc(id.as_str()).map_err(DesktopError::Store)? else {
            return Ok(false);
        };
        if !record.is_trashed() {
            return Ok(false);
        }
        let owner = self.default_user()?;
        let restored = self.store.undelete_document(owner.id, id).map_err(DesktopError::Store)?;
        if restored {
            info!(doc_id = %id, "restored document from trash");
        }
        Ok(restored)
    }

    pub fn len(&self) -> usize {
        self.id_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_path.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocId, &Path)> {
        self.id_to_path.iter().map(|(id, path)| (id, path.as_path()))
    }

    pub fn default_user(&self) -> DesktopResult<User> {
        self.store
            .get_user_by_login(&self.default_email)
            .map_err(DesktopError::Store)?
            .ok_or_else(|| DesktopError::MissingDefaultUser { email: self.default_email.clone() })
    }

    fn insert(&mut self, id: DocId, path: PathBuf) {
        self.path_to_id.insert(path.clone(), id.clone());
        self.id_to_path.insert(id, path);
    }
}

fn path_to_string(path: &Path) -> DesktopResult<String> {
    path.to_str().map(str::to_string).ok_or_else(|| DesktopError::InvalidPath {
        path: path.to_path_buf(),
        reason: "path is not valid UTF-8".to_string(),
    })
}
