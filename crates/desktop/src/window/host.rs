// Seams between the registries and whatever actually shows windows.

use std::sync::Arc;

use anyhow::Result;
use gristdesk_common::types::{DocId, ImportPayload, WindowId};
use url::Url;

use crate::store::records::RecordStore;

/// Window primitives of the host GUI runtime.
///
/// Calls are fire-and-forget: they return once the request is handed to the
/// host. Navigation, load-complete and close come back as commands on the
/// dispatch loop.
pub trait WindowHost: Send {
    /// Create a top-level window and start loading `url` in it.
    fn create_window(&mut self, url: &Url) -> Result<WindowId>;

    fn navigate(&mut self, window: WindowId, url: &Url) -> Result<()>;

    fn focus(&mut self, window: WindowId) -> Result<()>;

    /// Hand raw file contents to the home view of `window` for import.
    fn deliver_import(&mut self, window: WindowId, payload: ImportPayload) -> Result<()>;

    /// Blocking error dialog, attached to `window` when given.
    fn show_error(&mut self, window: Option<WindowId>, title: &str, message: &str);

    /// Open `url` in the system browser.
    fn open_external(&mut self, url: &Url) -> Result<()>;

    /// The window is gone; drop anything kept for it.
    fn release(&mut self, _window: WindowId) {}
}

/// Resolves a document id or URL alias to the canonical document id.
pub trait DocIdResolver: Send + Sync {
    fn resolve(&self, id_or_alias: &str) -> Result<Option<DocId>>;
}

/// Resolution through the home database.
pub struct StoreResolver {
    store: Arc<dyn RecordStore>,
}

impl StoreResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

impl DocIdResolver for StoreResolver {
    fn resolve(&self, id_or_alias: &str) -> Result<Option<DocId>> {
        Ok(self.store.find_doc(id_or_alias)?.map(|record| record.id))
    }
}
