// End-to-end open flows through the dispatch loop with a recording window
// host and an in-process document server.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use gristdesk_common::file_kind::DEFAULT_IMPORTABLE_EXTENSIONS;
use gristdesk_common::types::{DocId, ImportPayload, WindowId};
use gristdesk_desktop::dispatch::app::App;
use gristdesk_common::protocol::jsonrpc::{Request, RequestId};
use gristdesk_common::protocol::rpc_methods::{APP_OPEN_FILE, WINDOW_LOADED};
use gristdesk_desktop::dispatch::command::{channel, AppCommand, CommandReceiver, CommandSender};
use gristdesk_desktop::dispatch::open::OpenDispatcher;
use gristdesk_desktop::dispatch::recent::RecentItems;
use gristdesk_desktop::lifecycle::{DocHandle, DocServer, DocumentLifecycle, OpenMode, SessionContext};
use gristdesk_desktop::registry::path_registry::PathRegistry;
use gristdesk_desktop::rpc::methods::{dispatch_bridge_request, RpcState};
use gristdesk_desktop::store::home_db::HomeDb;
use gristdesk_desktop::store::records::{RecordStore, SqliteRecordStore};
use gristdesk_desktop::window::host::{StoreResolver, WindowHost};
use gristdesk_desktop::window::registry::WindowRegistry;
use serde_json::json;
use tempfile::TempDir;
use url::Url;

const EMAIL: &str = "you@example.com";
const HOME: &str = "http://localhost:47478";

#[derive(Default)]
struct Recorded {
    next: u64,
    created: Vec<Url>,
    navigated: Vec<(WindowId, Url)>,
    focused: Vec<WindowId>,
    delivered: Vec<(WindowId, String, usize)>,
    errors: Vec<String>,
}

#[derive(Clone, Default)]
struct RecordingHost(Arc<Mutex<Recorded>>);

impl RecordingHost {
    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.0.lock().expect("recorder lock should not be poisoned")
    }
}

impl WindowHost for RecordingHost {
    fn create_window(&mut self, url: &Url) -> Result<WindowId> {
        let mut recorded = self.recorded();
        recorded.next += 1;
        recorded.created.push(url.clone());
        Ok(WindowId(recorded.next))
    }

    fn navigate(&mut self, window: WindowId, url: &Url) -> Result<()> {
        self.recorded().navigated.push((window, url.clone()));
        Ok(())
    }

    fn focus(&mut self, window: WindowId) -> Result<()> {
        self.recorded().focused.push(window);
        Ok(())
    }

    fn deliver_import(&mut self, window: WindowId, payload: ImportPayload) -> Result<()> {
        self.recorded().delivered.push((window, payload.file_name, payload.contents.len()));
        Ok(())
    }

    fn show_error(&mut self, _window: Option<WindowId>, _title: &str, message: &str) {
        self.recorded().errors.push(message.to_string());
    }

    fn open_external(&mut self, _url: &Url) -> Result<()> {
        Ok(())
    }
}

struct NoopServer;

#[async_trait]
impl DocServer for NoopServer {
    async fn open_doc(&self, _session: SessionContext, doc_id: &DocId, _mode: OpenMode) -> Result<DocHandle> {
        Ok(DocHandle { doc_id: doc_id.clone(), handle: "noop".into() })
    }

    async fn wait_plugins_ready(&self, _handle: &DocHandle) -> Result<()> {
        Ok(())
    }

    async fn import_upload(&self, _handle: &DocHandle, _upload_id: i64) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    app: App,
    host: RecordingHost,
    store: SqliteRecordStore,
    commands: CommandSender,
    receiver: CommandReceiver,
}

fn start(db_path: &Path, docs_root: &Path) -> Harness {
    let store = SqliteRecordStore::new(HomeDb::open(db_path).expect("home db should open"));
    let user = store.ensure_default_user(EMAIL, "You").expect("default user should be created");
    let shared: Arc<dyn RecordStore> = Arc::new(store.clone());
    let (paths, _) = PathRegistry::initialize(shared.clone(), EMAIL).expect("registry should initialize");
    let host = RecordingHost::default();
    let windows = WindowRegistry::new(
        Box::new(host.clone()),
        Arc::new(StoreResolver::new(shared.clone())),
        Url::parse(HOME).expect("home url should parse"),
        Some("secret".into()),
    );
    let (commands, receiver) = channel();
    let app = App::new(
        paths,
        windows,
        DocumentLifecycle::new(Arc::new(NoopServer)),
        OpenDispatcher::new(DEFAULT_IMPORTABLE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()),
        RecentItems::new(shared, user.id),
        docs_root.to_path_buf(),
        commands.clone(),
    );
    Harness { app, host, store, commands, receiver }
}

#[test]
fn csv_import_opens_home_window_and_delivers_one_payload_after_load() {
    let tmp = TempDir::new().expect("tempdir should be created");
    let csv = tmp.path().join("report.csv");
    std::fs::write(&csv, b"a,b\n1,2\n").expect("csv should be written");
    let mut h = start(&tmp.path().join("home.db"), tmp.path());

    h.app.handle(AppCommand::OpenFile { path: csv, requesting: None });
    let window = h.app.windows().last_window().expect("a window should be open");
    {
        let recorded = h.host.recorded();
        assert_eq!(recorded.created.len(), 1);
        assert_eq!(recorded.created[0].path(), "/");
        assert!(recorded.delivered.is_empty(), "nothing is delivered before the page loads");
    }
    assert!(h.app.paths().is_empty(), "imports do not register the source file");

    h.app.handle(AppCommand::WindowLoaded { window });
    h.app.handle(AppCommand::WindowLoaded { window });
    assert_eq!(h.host.recorded().delivered, vec![(window, "report.csv".to_string(), 8)]);
}

#[test]
fn opening_the_same_document_twice_reuses_its_window() {
    let tmp = TempDir::new().expect("tempdir should be created");
    let doc = tmp.path().join("budget.grist");
    std::fs::write(&doc, b"").expect("doc should be written");
    let mut h = start(&tmp.path().join("home.db"), tmp.path());

    h.app.handle(AppCommand::OpenFile { path: doc.clone(), requesting: None });
    let first = h.app.windows().last_window().expect("window should be open");
    h.app.handle(AppCommand::OpenFile { path: doc, requesting: None });

    assert_eq!(h.app.paths().len(), 1);
    let recorded = h.host.recorded();
    assert_eq!(recorded.created.len(), 1);
    assert_eq!(recorded.focused, vec![first]);
    assert_eq!(h.store.get_all_docs().expect("docs should load").len(), 1);
}

#[test]
fn unsupported_file_is_refused_without_side_effects() {
    let tmp = TempDir::new().expect("tempdir should be created");
    let pdf = tmp.path().join("manual.pdf");
    std::fs::write(&pdf, b"%PDF-1.7").expect("pdf should be written");
    let mut h = start(&tmp.path().join("home.db"), tmp.path());

    h.app.handle(AppCommand::OpenFile { path: pdf, requesting: None });

    assert!(h.app.windows().last_window().is_none());
    assert!(h.app.paths().is_empty());
    assert!(h.store.get_all_docs().expect("docs should load").is_empty());
    let recorded = h.host.recorded();
    assert_eq!(recorded.errors.len(), 1);
    assert!(recorded.errors[0].contains("manual.pdf"));
    assert!(recorded.errors[0].contains("unsupported"));
}

#[test]
fn in_window_navigation_moves_the_document_binding() {
    let tmp = TempDir::new().expect("tempdir should be created");
    let a = tmp.path().join("a.grist");
    let b = tmp.path().join("b.grist");
    std::fs::write(&a, b"").expect("a should be written");
    std::fs::write(&b, b"").expect("b should be written");
    let mut h = start(&tmp.path().join("home.db"), tmp.path());

    h.app.handle(AppCommand::OpenFile { path: a.clone(), requesting: None });
    let window = h.app.windows().last_window().expect("window should be open");
    let a_id = h.app.paths().lookup_by_path(&a.canonicalize().expect("a exists")).cloned().expect("a registered");

    // Registering b without showing it, then navigating the window there.
    let mut registry = PathRegistry::initialize(Arc::new(h.store.clone()), EMAIL).expect("registry loads").0;
    let b_id = registry.lookup_by_path_or_create(&b.canonicalize().expect("b exists")).expect("b registered");
    h.app.handle(AppCommand::WindowNavigated { window, url: format!("{HOME}/doc/{b_id}/p/2") });

    assert_eq!(h.app.windows().get(&a_id), None);
    assert_eq!(h.app.windows().get(&b_id), Some(window));
    assert_eq!(h.app.windows().doc_for(window), Some(&b_id));
}

#[test]
fn startup_prunes_records_whose_files_are_gone() {
    let tmp = TempDir::new().expect("tempdir should be created");
    let db_path = tmp.path().join("home.db");
    let kept = tmp.path().join("kept.grist");
    let gone = tmp.path().join("gone.grist");
    std::fs::write(&kept, b"").expect("kept should be written");
    std::fs::write(&gone, b"").expect("gone should be written");

    {
        let mut h = start(&db_path, tmp.path());
        h.app.handle(AppCommand::OpenFile { path: kept.clone(), requesting: None });
        h.app.handle(AppCommand::OpenFile { path: gone.clone(), requesting: None });
        assert_eq!(h.app.paths().len(), 2);
    }
    std::fs::remove_file(&gone).expect("gone should be removed");

    let h = start(&db_path, tmp.path());
    assert_eq!(h.app.paths().len(), 1);
    assert!(h.app.paths().lookup_by_path(&kept.canonicalize().expect("kept exists")).is_some());
    let records = h.store.get_all_docs().expect("docs should load");
    assert_eq!(records.len(), 1);
}

#[test]
fn restarting_keeps_document_ids_stable() {
    let tmp = TempDir::new().expect("tempdir should be created");
    let db_path = tmp.path().join("home.db");
    let doc = tmp.path().join("stable.grist");
    std::fs::write(&doc, b"").expect("doc should be written");
    let canonical = doc.canonicalize().expect("doc exists");

    let first_id = {
        let mut h = start(&db_path, tmp.path());
        h.app.handle(AppCommand::OpenFile { path: doc.clone(), requesting: None });
        h.app.paths().lookup_by_path(&canonical).cloned().expect("doc registered")
    };

    let mut h = start(&db_path, tmp.path());
    h.app.handle(AppCommand::OpenFile { path: doc, requesting: None });
    assert_eq!(h.app.paths().lookup_by_path(&canonical), Some(&first_id));
    assert_eq!(h.store.get_all_docs().expect("docs should load").len(), 1);
    let recorded = h.host.recorded();
    assert_eq!(recorded.created.len(), 1);
    assert!(recorded.created[0].path().ends_with(first_id.as_str()));
}

#[tokio::test]
async fn file_dropped_on_a_home_window_is_imported_there() {
    let tmp = TempDir::new().expect("tempdir should be created");
    let csv = tmp.path().join("dropped.csv");
    std::fs::write(&csv, b"x\n").expect("csv should be written");
    let mut h = start(&tmp.path().join("home.db"), tmp.path());
    h.app.handle(AppCommand::Startup { path: None });
    let home = h.app.windows().last_window().expect("home window should be open");

    let rpc = RpcState::new(h.commands.clone());
    for request in [
        Request::new(APP_OPEN_FILE, Some(json!({ "path": csv })), RequestId::Null),
        Request::new(WINDOW_LOADED, None, RequestId::Null),
    ] {
        assert!(dispatch_bridge_request(home, request, &rpc).await.is_none());
        let command = h.receiver.recv().await.expect("bridge should forward the notification");
        h.app.handle(command);
    }

    let recorded = h.host.recorded();
    assert_eq!(recorded.created.len(), 1, "the home window is reused");
    assert_eq!(recorded.navigated.len(), 1);
    assert_eq!(recorded.delivered, vec![(home, "dropped.csv".to_string(), 2)]);
}
