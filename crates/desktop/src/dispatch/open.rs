// "Open this file": normalize, classify, then either show the document in a
// window or hand the raw contents to a home view for import.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use gristdesk_common::file_kind::{classify, FileKind};
use gristdesk_common::path::normalize_path;
use gristdesk_common::types::{DocId, ImportPayload, WindowId};
use tracing::{debug, info};

use crate::error::{DesktopError, DesktopResult};
use crate::registry::path_registry::PathRegistry;
use crate::window::registry::WindowRegistry;

/// What an open request ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    Document { doc_id: DocId, path: PathBuf, window: WindowId, placement: Placement },
    /// Payload parked until `window` reports load-complete.
    Import { window: WindowId, file_name: String },
}

impl Opened {
    pub fn window(&self) -> WindowId {
        match self {
            Self::Document { window, .. } | Self::Import { window, .. } => *window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The document was already open there.
    Focused,
    /// The requesting window showed no document and now shows this one.
    Reused,
    Created,
}

/// Import payloads waiting for their window's next load-complete, in request
/// order. Each is handed out at most once.
#[derive(Debug, Default)]
pub struct PendingImports {
    by_window: HashMap<WindowId, VecDeque<ImportPayload>>,
}

impl PendingImports {
    /// Queue `payload` for `window` behind anything already waiting there.
    pub fn park(&mut self, window: WindowId, payload: ImportPayload) {
        self.by_window.entry(window).or_default().push_back(payload);
    }

    /// Everything queued for `window`, oldest first.
    pub fn take(&mut self, window: WindowId) -> Vec<ImportPayload> {
        self.by_window.remove(&window).map(Vec::from).unwrap_or_default()
    }

    pub fn is_pending(&self, window: WindowId) -> bool {
        self.by_window.contains_key(&window)
    }

    /// Number of queued payloads across all windows.
    pub fn len(&self) -> usize {
        self.by_window.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_window.is_empty()
    }
}

pub struct OpenDispatcher {
    importable: Vec<String>,
}

impl OpenDispatcher {
    /// `importable` lists extensions routed through the import flow.
    pub fn new(importable: Vec<String>) -> Self {
        Self { importable }
    }

    /// Canonical absolute form of `path` (relative paths are taken from
    /// `cwd`) and how it is opened.
    pub fn resolve(&self, path: &Path, cwd: &Path) -> DesktopResult<(PathBuf, FileKind)> {
        let normalized = normalize_path(path, cwd)
            .map_err(|error| DesktopError::InvalidPath { path: path.to_path_buf(), reason: error.to_string() })?;
        match classify(&normalized, &self.importable) {
            Some(kind) => Ok((normalized, kind)),
            None => Err(DesktopError::UnsupportedFormat { path: normalized }),
        }
    }

    /// Open `path` for the user. `requesting` is the window the request came
    /// from; it is reused when it shows no document.
    pub fn open_file(
        &self,
        paths: &mut PathRegistry,
        windows: &mut WindowRegistry,
        pending: &mut PendingImports,
        path: &Path,
        cwd: &Path,
        requesting: Option<WindowId>,
    ) -> DesktopResult<Opened> {
        let (path, kind) = self.resolve(path, cwd)?;
        let reusable = requesting.filter(|window| windows.is_open(*window) && windows.doc_for(*window).is_none());
        debug!(path = %path.display(), ?kind, reusable = ?reusable.map(|window| window.0), "opening file");
        match kind {
            FileKind::Native => open_document(paths, windows, path, reusable),
            FileKind::Importable => open_import(windows, pending, path, reusable),
        }
    }
}

fn open_document(
    paths: &mut PathRegistry,
    windows: &mut WindowRegistry,
    path: PathBuf,
    reusable: Option<WindowId>,
) -> DesktopResult<Opened> {
    match std::fs::metadata(&path) {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => {
            return Err(DesktopError::FileUnreadable {
                source: std::io::Error::other("not a regular file"),
                path,
            })
        }
        Err(error) => return Err(read_error(path, error)),
    }

    let doc_id = paths.lookup_by_path_or_create(&path)?;
    paths.undelete(&doc_id)?;

    let (window, placement) = if let Some(window) = windows.get(&doc_id) {
        windows.focus(window)?;
        (window, Placement::Focused)
    } else if let Some(window) = reusable {
        windows.navigate(window, Some(doc_id.clone()))?;
        (window, Placement::Reused)
    } else {
        (windows.add(Some(doc_id.clone()))?, Placement::Created)
    };
    info!(doc_id = %doc_id, path = %path.display(), window = %window, ?placement, "opened document");
    Ok(Opened::Document { doc_id, path, window, placement })
}

fn open_import(
    windows: &mut WindowRegistry,
    pending: &mut PendingImports,
    path: PathBuf,
    reusable: Option<WindowId>,
) -> DesktopResult<Opened> {
    let contents = match std::fs::read(&path) {
        Ok(contents) => contents,
        Err(error) => return Err(read_error(path, error)),
    };
    let file_name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();

    let window = match reusable {
        Some(window) => {
            windows.navigate(window, None)?;
            window
        }
        None => windows.add(None)?,
    };
    pending.park(window, ImportPayload { file_name: file_name.clone(), contents });
    info!(path = %path.display(), window = %window, queued = pending.len(), "import waiting for window to load");
    Ok(Opened::Import { window, file_name })
}

fn read_error(path: PathBuf, error: std::io::Error) -> DesktopError {
    if error.kind() == ErrorKind::NotFound {
        DesktopError::FileNotFound { path }
    } else {
        DesktopError::FileUnreadable { path, source: error }
    }
}
