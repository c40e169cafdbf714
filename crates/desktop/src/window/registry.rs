// Which top-level window shows which document.
//
// `window_to_doc` has an entry for every live window, `None` meaning the home
// view. `doc_to_window` holds a document only while a live window shows it,
// and always points back at a window whose entry names that document.

use std::collections::HashMap;
use std::sync::Arc;

use gristdesk_common::types::{DocId, WindowId};
use tracing::{debug, info, warn};
use url::Url;

use super::host::{DocIdResolver, WindowHost};
use super::urls;
use crate::error::{DesktopError, DesktopResult};

pub struct WindowRegistry {
    host: Box<dyn WindowHost>,
    resolver: Arc<dyn DocIdResolver>,
    home_url: Url,
    credential: Option<String>,
    doc_to_window: HashMap<DocId, WindowId>,
    window_to_doc: HashMap<WindowId, Option<DocId>>,
    // Live windows, least recently used first.
    recency: Vec<WindowId>,
}

impl WindowRegistry {
    pub fn new(
        host: Box<dyn WindowHost>,
        resolver: Arc<dyn DocIdResolver>,
        home_url: Url,
        credential: Option<String>,
    ) -> Self {
        Self {
            host,
            resolver,
            home_url,
            credential,
            doc_to_window: HashMap::new(),
            window_to_doc: HashMap::new(),
            recency: Vec::new(),
        }
    }

    pub fn get(&self, doc: &DocId) -> Option<WindowId> {
        self.doc_to_window.get(doc).copied()
    }

    /// Window showing `doc`, or a new one opened on it. `None` opens the home
    /// view in a new window.
    pub fn add(&mut self, doc: Option<DocId>) -> DesktopResult<WindowId> {
        if let Some(window) = doc.as_ref().and_then(|doc| self.get(doc)) {
            return Ok(window);
        }

        let url = self.get_url(doc.as_ref());
        let window = self.host.create_window(&url).map_err(DesktopError::Host)?;
        if let Some(doc) = &doc {
            self.doc_to_window.insert(doc.clone(), window);
        }
        info!(window = %window, doc_id = ?doc.as_ref().map(DocId::as_str), "opened window");
        self.window_to_doc.insert(window, doc);
        self.touch(window);
        Ok(window)
    }

    /// Reuse `window` for `doc`, installing the association before the
    /// navigation starts. If the host refuses, the previous association is
    /// restored.
    pub fn navigate(&mut self, window: WindowId, doc: Option<DocId>) -> DesktopResult<()> {
        let url = self.get_url(doc.as_ref());
        let shown = self.window_to_doc.get(&window).cloned();
        let shown_owner = shown.clone().flatten().map(|old| (self.doc_to_window.get(&old).copied(), old));
        let doc_owner = doc.as_ref().map(|doc| (self.doc_to_window.get(doc).copied(), doc.clone()));

        self.associate(window, doc);
        if let Err(error) = self.host.navigate(window, &url) {
            for (owner, doc) in [doc_owner, shown_owner].into_iter().flatten() {
                match owner {
                    Some(owner) => self.doc_to_window.insert(doc, owner),
                    None => self.doc_to_window.remove(&doc),
                };
            }
            match shown {
                Some(shown) => self.window_to_doc.insert(window, shown),
                None => self.window_to_doc.remove(&window),
            };
            warn!(window = %window, error = %format!("{error:#}"), "navigation refused, association restored");
            return Err(DesktopError::Host(error));
        }
        Ok(())
    }

    /// A window finished navigating to `url`.
    pub fn on_navigated(&mut self, window: WindowId, url: &Url) {
        if !self.window_to_doc.contains_key(&window) {
            warn!(window = %window, url = %url, "navigation event for unknown window");
            return;
        }
        let doc = self.doc_from_url(url);
        debug!(window = %window, doc_id = ?doc.as_ref().map(DocId::as_str), "window navigated");
        self.associate(window, doc);
    }

    pub fn on_closed(&mut self, window: WindowId) {
        let Some(doc) = self.window_to_doc.remove(&window) else {
            return;
        };
        if let Some(doc) = doc {
            self.release(&doc, window);
        }
        self.recency.retain(|candidate| *candidate != window);
        self.host.release(window);
        info!(window = %window, "window closed");
    }

    /// Home URL, or the URL of `doc`, with the login credential attached.
    pub fn get_url(&self, doc: Option<&DocId>) -> Url {
        urls::doc_url(&self.home_url, doc, self.credential.as_deref())
    }

    pub fn focus(&mut self, window: WindowId) -> DesktopResult<()> {
        self.touch(window);
        self.host.focus(window).map_err(DesktopError::Host)
    }

    /// The most recently opened or focused live window.
    pub fn last_window(&self) -> Option<WindowId> {
        self.recency.last().copied()
    }

    pub fn is_open(&self, window: WindowId) -> bool {
        self.window_to_doc.contains_key(&window)
    }

    /// Document shown by `window`; `None` for the home view or an unknown window.
    pub fn doc_for(&self, window: WindowId) -> Option<&DocId> {
        self.window_to_doc.get(&window).and_then(Option::as_ref)
    }

    pub fn windows(&self) -> impl Iterator<Item = (WindowId, Option<&DocId>)> {
        self.window_to_doc.iter().map(|(window, doc)| (*window, doc.as_ref()))
    }

    pub fn is_app_url(&self, url: &Url) -> bool {
        urls::is_app_url(&self.home_url, url)
    }

    /// Canonical id of the document a page URL points at.
    pub fn doc_from_url(&self, url: &Url) -> Option<DocId> {
        urls::doc_ref_from_url(url).map(|reference| self.resolve(&reference))
    }

    pub fn host_mut(&mut self) -> &mut dyn WindowHost {
        self.host.as_mut()
    }

    fn associate(&mut self, window: WindowId, doc: Option<DocId>) {
        if let Some(Some(old)) = self.window_to_doc.get(&window).cloned() {
            self.release(&old, window);
        }
        if let Some(doc) = &doc {
            if let Some(previous) = self.doc_to_window.insert(doc.clone(), window) {
                if previous != window {
                    debug!(doc_id = %doc, from = %previous, to = %window, "document now tracked in another window");
                }
            }
        }
        self.window_to_doc.insert(window, doc);
    }

    // Drop the doc -> window entry only if it still points at `window`.
    fn release(&mut self, doc: &DocId, window: WindowId) {
        if self.doc_to_window.get(doc) == Some(&window) {
            self.doc_to_window.remove(doc);
        }
    }

    fn resolve(&self, reference: &str) -> DocId {
        match self.resolver.resolve(reference) {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(reference, "unknown document in window URL, using it as the id");
                DocId::new(reference)
            }
            Err(error) => {
                warn!(reference, error = %format!("{error:#}"), "failed to resolve document in window URL");
                DocId::new(reference)
            }
        }
    }

    fn touch(&mut self, window: WindowId) {
        if !self.window_to_doc.contains_key(&window) {
            return;
        }
        self.recency.retain(|candidate| *candidate != window);
        self.recency.push(window);
    }
}
