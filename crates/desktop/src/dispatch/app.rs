// The dispatch loop. It owns both registries; every request reaches it as an
// `AppCommand` and runs to completion before the next one starts.

use std::path::{Path, PathBuf};

use gristdesk_common::types::{NewDocument, WindowId};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use super::command::{AppCommand, CommandReceiver, CommandSender, Reply};
use super::open::{OpenDispatcher, Opened, PendingImports};
use super::recent::RecentItems;
use crate::error::{DesktopError, DesktopResult};
use crate::lifecycle::DocumentLifecycle;
use crate::registry::path_registry::PathRegistry;
use crate::window::registry::WindowRegistry;

pub struct App {
    paths: PathRegistry,
    windows: WindowRegistry,
    lifecycle: DocumentLifecycle,
    opener: OpenDispatcher,
    pending: PendingImports,
    recent: RecentItems,
    docs_root: PathBuf,
    commands: CommandSender,
}

impl App {
    /// `commands` must feed the receiver later passed to [`App::run`]; spawned
    /// imports report back through it.
    pub fn new(
        paths: PathRegistry,
        windows: WindowRegistry,
        lifecycle: DocumentLifecycle,
        opener: OpenDispatcher,
        recent: RecentItems,
        docs_root: PathBuf,
        commands: CommandSender,
    ) -> Self {
        Self {
            paths,
            windows,
            lifecycle,
            opener,
            pending: PendingImports::default(),
            recent,
            docs_root,
            commands,
        }
    }

    pub fn paths(&self) -> &PathRegistry {
        &self.paths
    }

    pub fn windows(&self) -> &WindowRegistry {
        &self.windows
    }

    pub fn pending(&self) -> &PendingImports {
        &self.pending
    }

    /// Handle commands until `shutdown` fires.
    pub async fn run(mut self, mut commands: CommandReceiver, mut shutdown: broadcast::Receiver<()>) {
        info!("dispatch loop started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle(command);
                }
                _ = shutdown.recv() => break,
            }
        }
        info!("dispatch loop stopped");
    }

    pub fn handle(&mut self, command: AppCommand) {
        debug!(command = command.kind(), "handling command");
        match command {
            AppCommand::Startup { path } => self.startup(path),
            AppCommand::OpenFile { path, requesting } | AppCommand::MenuFileOpen { path, requesting } => {
                self.open_and_report(&path, &process_cwd(), requesting);
            }
            AppCommand::OpenRecent { path } => {
                self.open_and_report(&path, &process_cwd(), None);
            }
            AppCommand::MenuFileNew => self.open_home(),
            AppCommand::SecondInstance { argv, cwd } => self.second_instance(argv, &cwd),
            AppCommand::WindowNavigated { window, url } => match Url::parse(&url) {
                Ok(url) => self.windows.on_navigated(window, &url),
                Err(error) => warn!(window = %window, url = %url, %error, "ignoring navigation to unparsable URL"),
            },
            AppCommand::WindowLoaded { window } => self.window_loaded(window),
            AppCommand::WindowClosed { window } => {
                let dropped = self.pending.take(window);
                if !dropped.is_empty() {
                    warn!(window = %window, count = dropped.len(), "window closed before its imports were delivered");
                }
                self.windows.on_closed(window);
            }
            AppCommand::WindowOpenUrl { window, url } => self.open_url(window, &url),
            AppCommand::CreateDoc { window, path, reply } => {
                let created = self.lifecycle.register(&mut self.paths, path.as_deref());
                if let Ok(Some(doc)) = &created {
                    info!(doc_id = %doc.id, window = %window, "created document");
                    self.remember(&doc.path);
                }
                let _ = reply.send(created);
            }
            AppCommand::ImportDoc { window, upload_id, path, reply } => {
                self.start_import(window, upload_id, path, reply);
            }
            AppCommand::ImportFinished { doc, result, reply } => {
                let finished = DocumentLifecycle::finish_import(&mut self.paths, doc, result);
                if let Ok(doc) = &finished {
                    self.remember(&doc.path);
                }
                let _ = reply.send(finished.map(Some));
            }
            AppCommand::StoragePath { doc_id, reply } => {
                let _ = reply.send(self.paths.storage_path(&doc_id, &self.docs_root));
            }
            AppCommand::RecentItems { reply } => {
                let items = self.recent.list().unwrap_or_else(|error| {
                    warn!(error = %format!("{error:#}"), "failed to read recent items");
                    Vec::new()
                });
                let _ = reply.send(items);
            }
        }
    }

    fn startup(&mut self, path: Option<PathBuf>) {
        let Some(path) = path else {
            self.open_home();
            return;
        };
        if self.open_and_report(&path, &process_cwd(), None).is_none() {
            info!(path = %path.display(), "startup file could not be opened, showing home");
            self.open_home();
        }
    }

    fn second_instance(&mut self, argv: Vec<String>, cwd: &Path) {
        let args: Vec<String> = argv.into_iter().filter(|arg| !arg.starts_with('-')).collect();
        debug!(?args, cwd = %cwd.display(), "second instance started");
        if let Some(file) = args.get(1) {
            self.open_and_report(Path::new(file), cwd, None);
            return;
        }
        match self.windows.last_window() {
            Some(window) => {
                if let Err(error) = self.windows.focus(window) {
                    self.report(Some(window), &error);
                }
            }
            None => self.open_home(),
        }
    }

    /// Open a file, showing any failure to the user. `None` on failure.
    fn open_and_report(&mut self, path: &Path, cwd: &Path, requesting: Option<WindowId>) -> Option<Opened> {
        match self.opener.open_file(&mut self.paths, &mut self.windows, &mut self.pending, path, cwd, requesting) {
            Ok(opened) => {
                if let Opened::Document { path, .. } = &opened {
                    self.remember(path);
                }
                Some(opened)
            }
            Err(error) => {
                warn!(path = %path.display(), code = error.code(), error = %error, "failed to open file");
                self.report(requesting, &error);
                None
            }
        }
    }

    fn open_home(&mut self) {
        if let Err(error) = self.windows.add(None) {
            self.report(None, &error);
        }
    }

    fn window_loaded(&mut self, window: WindowId) {
        for payload in self.pending.take(window) {
            let file_name = payload.file_name.clone();
            match self.windows.host_mut().deliver_import(window, payload) {
                Ok(()) => info!(window = %window, file_name = %file_name, "delivered import payload"),
                Err(error) => self.report(Some(window), &DesktopError::Host(error)),
            }
        }
    }

    fn open_url(&mut self, window: WindowId, raw: &str) {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(error) => {
                warn!(window = %window, url = raw, %error, "ignoring request to open unparsable URL");
                return;
            }
        };
        if !self.windows.is_app_url(&url) {
            if let Err(error) = self.windows.host_mut().open_external(&url) {
                self.report(Some(window), &DesktopError::Host(error));
            }
            return;
        }

        let doc = self.windows.doc_from_url(&url);
        let result = match doc.as_ref().and_then(|doc| self.windows.get(doc)) {
            Some(existing) => self.windows.focus(existing),
            None => self.windows.add(doc).map(drop),
        };
        if let Err(error) = result {
            self.report(Some(window), &error);
        }
    }

    fn start_import(
        &mut self,
        window: WindowId,
        upload_id: i64,
        path: Option<PathBuf>,
        reply: Reply<DesktopResult<Option<NewDocument>>>,
    ) {
        let doc = match self.lifecycle.register(&mut self.paths, path.as_deref()) {
            Ok(Some(doc)) => doc,
            other => {
                let _ = reply.send(other);
                return;
            }
        };

        debug!(doc_id = %doc.id, window = %window, upload_id, "starting import");
        let task = self.lifecycle.import_task(doc.id.clone(), upload_id);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = task.await;
            if let Err(error) = commands.send(AppCommand::ImportFinished { doc, result, reply }).await {
                warn!(error = %error, "dispatch loop gone before import finished");
            }
        });
    }

    fn remember(&self, path: &Path) {
        if let Err(error) = self.recent.record(path) {
            warn!(path = %path.display(), error = %format!("{error:#}"), "failed to update recent items");
        }
    }

    fn report(&mut self, window: Option<WindowId>, error: &DesktopError) {
        let window = window.filter(|window| self.windows.is_open(*window));
        self.windows.host_mut().show_error(window, error.title(), &error.to_string());
    }
}

fn process_cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use gristdesk_common::file_kind::DEFAULT_IMPORTABLE_EXTENSIONS;
    use gristdesk_common::types::{DocId, ImportPayload};
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    use super::*;
    use crate::dispatch::command::channel;
    use crate::lifecycle::{DocHandle, DocServer, OpenMode, SessionContext};
    use crate::store::home_db::HomeDb;
    use crate::store::records::{RecordStore, SqliteRecordStore};
    use crate::window::host::{StoreResolver, WindowHost};

    const EMAIL: &str = "you@example.com";

    #[derive(Default)]
    struct Seen {
        next: u64,
        created: Vec<Url>,
        focused: Vec<WindowId>,
        delivered: Vec<(WindowId, String)>,
        errors: Vec<(Option<WindowId>, String)>,
        external: Vec<Url>,
    }

    struct FakeHost(Arc<Mutex<Seen>>);

    impl WindowHost for FakeHost {
        fn create_window(&mut self, url: &Url) -> Result<WindowId> {
            let mut seen = self.0.lock().unwrap();
            seen.next += 1;
            seen.created.push(url.clone());
            Ok(WindowId(seen.next))
        }
        fn navigate(&mut self, _window: WindowId, _url: &Url) -> Result<()> {
            Ok(())
        }
        fn focus(&mut self, window: WindowId) -> Result<()> {
            self.0.lock().unwrap().focused.push(window);
            Ok(())
        }
        fn deliver_import(&mut self, window: WindowId, payload: ImportPayload) -> Result<()> {
            self.0.lock().unwrap().delivered.push((window, payload.file_name));
            Ok(())
        }
        fn show_error(&mut self, window: Option<WindowId>, _title: &str, message: &str) {
            self.0.lock().unwrap().errors.push((window, message.to_string()));
        }
        fn open_external(&mut self, url: &Url) -> Result<()> {
            self.0.lock().unwrap().external.push(url.clone());
            Ok(())
        }
    }

    struct InstantServer {
        fail: bool,
    }

    #[async_trait]
    impl DocServer for InstantServer {
        async fn open_doc(&self, _session: SessionContext, doc_id: &DocId, _mode: OpenMode) -> Result<DocHandle> {
            Ok(DocHandle { doc_id: doc_id.clone(), handle: "h".into() })
        }
        async fn wait_plugins_ready(&self, _handle: &DocHandle) -> Result<()> {
            Ok(())
        }
        async fn import_upload(&self, _handle: &DocHandle, upload_id: i64) -> Result<()> {
            if self.fail {
                anyhow::bail!("upload {upload_id} rejected");
            }
            Ok(())
        }
    }

    struct Fixture {
        tmp: TempDir,
        app: App,
        receiver: CommandReceiver,
        seen: Arc<Mutex<Seen>>,
        store: SqliteRecordStore,
    }

    fn fixture(fail_import: bool) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = SqliteRecordStore::new(HomeDb::open_in_memory().unwrap());
        let user = store.ensure_default_user(EMAIL, "You").unwrap();
        let shared: Arc<dyn RecordStore> = Arc::new(store.clone());
        let (paths, _) = PathRegistry::initialize(shared.clone(), EMAIL).unwrap();
        let seen = Arc::new(Mutex::new(Seen::default()));
        let windows = WindowRegistry::new(
            Box::new(FakeHost(seen.clone())),
            Arc::new(StoreResolver::new(shared.clone())),
            Url::parse("http://localhost:47478").unwrap(),
            Some("k".into()),
        );
        let (commands, receiver) = channel();
        let app = App::new(
            paths,
            windows,
            DocumentLifecycle::new(Arc::new(InstantServer { fail: fail_import })),
            OpenDispatcher::new(DEFAULT_IMPORTABLE_EXTENSIONS.iter().map(|e| e.to_string()).collect()),
            RecentItems::new(shared, user.id),
            tmp.path().join("docs"),
            commands,
        );
        Fixture { tmp, app, receiver, seen, store }
    }

    #[test]
    fn startup_without_file_opens_home() {
        let mut fx = fixture(false);
        fx.app.handle(AppCommand::Startup { path: None });
        let seen = fx.seen.lock().unwrap();
        assert_eq!(seen.created.len(), 1);
        assert_eq!(seen.created[0].path(), "/");
    }

    #[test]
    fn failed_startup_file_falls_back_to_home() {
        let mut fx = fixture(false);
        let pdf = fx.tmp.path().join("manual.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        fx.app.handle(AppCommand::Startup { path: Some(pdf) });

        let seen = fx.seen.lock().unwrap();
        assert_eq!(seen.errors.len(), 1);
        assert!(seen.errors[0].1.contains("manual.pdf"));
        assert_eq!(seen.created.len(), 1);
        assert_eq!(seen.created[0].path(), "/");
    }

    #[test]
    fn payload_is_delivered_once_after_load() {
        let mut fx = fixture(false);
        let csv = fx.tmp.path().join("report.csv");
        std::fs::write(&csv, b"a,b").unwrap();
        fx.app.handle(AppCommand::OpenFile { path: csv, requesting: None });
        let window = fx.app.windows().last_window().unwrap();
        assert!(fx.seen.lock().unwrap().delivered.is_empty());

        fx.app.handle(AppCommand::WindowLoaded { window });
        fx.app.handle(AppCommand::WindowLoaded { window });
        assert_eq!(fx.seen.lock().unwrap().delivered, vec![(window, "report.csv".to_string())]);
    }

    #[test]
    fn queued_imports_are_all_delivered_on_load() {
        let mut fx = fixture(false);
        fx.app.handle(AppCommand::MenuFileNew);
        let home = fx.app.windows().last_window().unwrap();
        for name in ["a.csv", "b.csv"] {
            let path = fx.tmp.path().join(name);
            std::fs::write(&path, b"x,y").unwrap();
            fx.app.handle(AppCommand::OpenFile { path, requesting: Some(home) });
        }
        assert_eq!(fx.app.pending().len(), 2);

        fx.app.handle(AppCommand::WindowLoaded { window: home });
        assert_eq!(
            fx.seen.lock().unwrap().delivered,
            vec![(home, "a.csv".to_string()), (home, "b.csv".to_string())]
        );
        assert!(fx.app.pending().is_empty());
    }

    // A record claims the path but the cache never admitted it.
    fn claim_behind_the_cache(fx: &Fixture, path: &Path) {
        let owner = fx.store.get_user_by_login(EMAIL).unwrap().unwrap();
        let workspace = fx.store.get_org_workspaces(&owner, 0).unwrap().remove(0);
        let external = path.canonicalize().unwrap();
        fx.store.add_document(&owner, workspace.id, "Stale", external.to_str().unwrap()).unwrap();
    }

    #[test]
    fn inconsistent_registry_is_reported_without_opening_a_window() {
        let mut fx = fixture(false);
        let path = fx.tmp.path().join("claimed.grist");
        std::fs::write(&path, b"").unwrap();
        claim_behind_the_cache(&fx, &path);

        fx.app.handle(AppCommand::OpenFile { path, requesting: None });

        let seen = fx.seen.lock().unwrap();
        assert!(seen.created.is_empty());
        assert_eq!(seen.errors.len(), 1);
        assert!(seen.errors[0].1.contains("claimed.grist"));
        assert!(seen.errors[0].1.contains("restart"));
        assert!(fx.app.paths().is_empty());
        assert_eq!(fx.store.get_all_docs().unwrap().len(), 1);
    }

    #[test]
    fn inconsistent_startup_file_falls_back_to_home() {
        let mut fx = fixture(false);
        let path = fx.tmp.path().join("claimed.grist");
        std::fs::write(&path, b"").unwrap();
        claim_behind_the_cache(&fx, &path);

        fx.app.handle(AppCommand::Startup { path: Some(path) });

        let seen = fx.seen.lock().unwrap();
        assert_eq!(seen.errors.len(), 1);
        assert!(seen.errors[0].1.contains("claimed.grist"));
        assert_eq!(seen.created.len(), 1);
        assert_eq!(seen.created[0].path(), "/");
    }

    #[test]
    fn unreadable_document_is_reported_with_its_path() {
        let mut fx = fixture(false);
        let dir = fx.tmp.path().join("folder.grist");
        std::fs::create_dir(&dir).unwrap();

        fx.app.handle(AppCommand::OpenFile { path: dir, requesting: None });

        let seen = fx.seen.lock().unwrap();
        assert!(seen.created.is_empty());
        assert_eq!(seen.errors.len(), 1);
        assert!(seen.errors[0].1.contains("folder.grist"));
        assert!(fx.store.get_all_docs().unwrap().is_empty());
    }

    #[test]
    fn closing_a_window_drops_its_pending_payload() {
        let mut fx = fixture(false);
        let csv = fx.tmp.path().join("report.csv");
        std::fs::write(&csv, b"a,b").unwrap();
        fx.app.handle(AppCommand::OpenFile { path: csv, requesting: None });
        let window = fx.app.windows().last_window().unwrap();

        fx.app.handle(AppCommand::WindowClosed { window });
        assert!(fx.app.pending().is_empty());
        assert!(!fx.app.windows().is_open(window));
    }

    #[test]
    fn second_instance_opens_relative_file_or_focuses_last_window() {
        let mut fx = fixture(false);
        std::fs::write(fx.tmp.path().join("b.grist"), b"").unwrap();

        fx.app.handle(AppCommand::SecondInstance { argv: vec!["gristdesk".into()], cwd: fx.tmp.path().into() });
        let home = fx.app.windows().last_window().unwrap();

        fx.app.handle(AppCommand::SecondInstance {
            argv: vec!["gristdesk".into(), "-psn_0_1234".into(), "b.grist".into()],
            cwd: fx.tmp.path().into(),
        });
        assert_eq!(fx.app.paths().len(), 1);
        let doc_window = fx.app.windows().last_window().unwrap();
        assert_ne!(doc_window, home);

        fx.app.handle(AppCommand::SecondInstance { argv: vec!["gristdesk".into()], cwd: "/".into() });
        assert_eq!(fx.seen.lock().unwrap().focused, vec![doc_window]);
    }

    #[test]
    fn opened_documents_become_recent_items() {
        let mut fx = fixture(false);
        let a = fx.tmp.path().join("a.grist");
        std::fs::write(&a, b"").unwrap();
        fx.app.handle(AppCommand::MenuFileOpen { path: a.clone(), requesting: None });

        let (reply, mut answer) = oneshot::channel();
        fx.app.handle(AppCommand::RecentItems { reply });
        let items = answer.try_recv().unwrap();
        assert_eq!(items, vec![a.canonicalize().unwrap().to_string_lossy().into_owned()]);
    }

    #[test]
    fn external_links_go_to_the_system_browser() {
        let mut fx = fixture(false);
        fx.app.handle(AppCommand::MenuFileNew);
        let window = fx.app.windows().last_window().unwrap();

        fx.app.handle(AppCommand::WindowOpenUrl { window, url: "https://www.getgrist.com/help".into() });
        fx.app.handle(AppCommand::WindowOpenUrl { window, url: "http://localhost:47478/o/docs/".into() });

        let seen = fx.seen.lock().unwrap();
        assert_eq!(seen.external.len(), 1);
        assert_eq!(seen.created.len(), 2);
    }

    #[test]
    fn storage_path_falls_back_to_docs_root() {
        let mut fx = fixture(false);
        let (reply, mut answer) = oneshot::channel();
        fx.app.handle(AppCommand::StoragePath { doc_id: DocId::new("xyz"), reply });
        assert_eq!(answer.try_recv().unwrap(), fx.tmp.path().join("docs").join("xyz.grist"));
    }

    #[tokio::test]
    async fn import_completes_through_the_loop() {
        let mut fx = fixture(false);
        let target = fx.tmp.path().join("Imported.grist");
        let (reply, answer) = oneshot::channel();
        fx.app.handle(AppCommand::ImportDoc { window: WindowId(1), upload_id: 4, path: Some(target.clone()), reply });

        let finished = fx.receiver.recv().await.expect("import should report back");
        assert_eq!(finished.kind(), "import_finished");
        fx.app.handle(finished);

        let doc = answer.await.unwrap().unwrap().expect("document should be created");
        let target = fx.tmp.path().canonicalize().unwrap().join("Imported.grist");
        assert_eq!(doc.path, target);
        assert_eq!(fx.app.paths().lookup_by_path(&target), Some(&doc.id));
    }

    #[tokio::test]
    async fn failed_import_is_rolled_back() {
        let mut fx = fixture(true);
        let target = fx.tmp.path().join("Broken.grist");
        let (reply, answer) = oneshot::channel();
        fx.app.handle(AppCommand::ImportDoc { window: WindowId(1), upload_id: 4, path: Some(target.clone()), reply });
        let finished = fx.receiver.recv().await.unwrap();
        fx.app.handle(finished);

        assert!(matches!(answer.await.unwrap(), Err(DesktopError::Server(_))));
        assert_eq!(fx.app.paths().lookup_by_path(&target), None);
        assert!(fx.store.get_all_docs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let fx = fixture(false);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let Fixture { app, receiver, .. } = fx;
        let task = tokio::spawn(app.run(receiver, shutdown_rx));
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
