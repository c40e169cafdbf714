// Process wiring: single-instance handover, then store, registries, window
// host, servers and the dispatch loop until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gristdesk_common::protocol::bridge::AppOpenParams;
use gristdesk_common::protocol::rpc_methods::APP_OPEN;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

use crate::config::DesktopConfig;
use crate::dispatch::app::App;
use crate::dispatch::command::{channel, AppCommand};
use crate::dispatch::open::OpenDispatcher;
use crate::dispatch::recent::RecentItems;
use crate::lifecycle::http_server::HttpDocServer;
use crate::lifecycle::DocumentLifecycle;
use crate::registry::path_registry::PathRegistry;
use crate::rpc::bridge::{self, BridgeState};
use crate::rpc::methods::RpcState;
use crate::rpc::unix::InstanceClient;
use crate::security::generate_credential;
use crate::startup::{is_instance_running, remove_pid_file, write_credential_file, write_pid_file, AppPaths};
use crate::store::home_db::HomeDb;
use crate::store::records::{RecordStore, SqliteRecordStore};
use crate::window::bridge_host::{BridgeHub, BridgeWindowHost};
use crate::window::host::StoreResolver;
use crate::window::registry::WindowRegistry;

const BRIDGE_HOST: &str = "127.0.0.1";

/// Whether this process became the running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    /// Another instance was running and received the arguments.
    HandedOver,
}

pub async fn run(config: DesktopConfig, file: Option<PathBuf>) -> Result<Role> {
    run_with_paths(config, AppPaths::resolve()?, file).await
}

pub async fn run_with_paths(config: DesktopConfig, paths: AppPaths, file: Option<PathBuf>) -> Result<Role> {
    if is_instance_running(&paths.socket_path).await {
        hand_over(&paths, file).await?;
        return Ok(Role::HandedOver);
    }

    let result = run_primary(config, &paths, file).await;
    cleanup_paths(&paths);
    result.map(|()| Role::Primary)
}

/// Forward our arguments to the running instance.
async fn hand_over(paths: &AppPaths, file: Option<PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let mut argv = vec![std::env::args().next().unwrap_or_else(|| "gristdesk".to_string())];
    argv.extend(file.map(|file| file.to_string_lossy().into_owned()));
    info!(socket_path = %paths.socket_path.display(), ?argv, "another instance is running, handing over");

    let _: Value = InstanceClient::new(paths.socket_path.clone())
        .call(APP_OPEN, AppOpenParams { argv, cwd })
        .await
        .context("failed to hand over to the running instance")?;
    Ok(())
}

async fn run_primary(config: DesktopConfig, paths: &AppPaths, file: Option<PathBuf>) -> Result<()> {
    #[cfg(unix)]
    let instance_listener = crate::startup::bind_socket(&paths.socket_path).await?;
    write_pid_file(&paths.pid_path)?;

    let home_url = config.home_url().context("invalid home URL")?;
    let credential = generate_credential();
    write_credential_file(&paths.credential_path, &credential)?;

    let db_path = config.home_db_path(&paths.base_dir);
    let db = HomeDb::open(&db_path).with_context(|| format!("failed to open home database `{}`", db_path.display()))?;
    let store = SqliteRecordStore::new(db);
    let user = store
        .ensure_default_user(&config.default_email, &config.default_username)
        .context("failed to set up default user")?;
    let store: Arc<dyn RecordStore> = Arc::new(store);

    let (path_registry, report) = PathRegistry::initialize(store.clone(), config.default_email.clone())
        .context("failed to reconcile document registry")?;
    info!(documents = report.admitted, pruned = report.pruned, "home database ready");

    let (commands, receiver) = channel();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);

    let bridge_listener = TcpListener::bind((BRIDGE_HOST, config.window.bridge_port))
        .await
        .context("failed to bind window bridge")?;
    let bridge_addr = bridge_listener.local_addr().context("failed to read window bridge address")?;
    let bridge_base = Url::parse(&format!("ws://{bridge_addr}/bridge")).context("invalid window bridge URL")?;
    info!(%bridge_addr, "window bridge ready");

    let hub = BridgeHub::new();
    let host = BridgeWindowHost::new(
        hub.clone(),
        commands.clone(),
        config.window.launcher.clone(),
        config.window.opener.clone(),
        bridge_base,
        config.window.track_exit,
    );
    let windows = WindowRegistry::new(
        Box::new(host),
        Arc::new(StoreResolver::new(store.clone())),
        home_url.clone(),
        config.attaches_credential().then(|| credential.clone()),
    );
    let server = HttpDocServer::new(home_url, credential, Duration::from_secs(config.request_timeout_secs))?;
    let docs_root = config.docs_dir(&paths.base_dir);

    let app = App::new(
        path_registry,
        windows,
        DocumentLifecycle::new(Arc::new(server)),
        OpenDispatcher::new(config.importable_extensions.clone()),
        RecentItems::new(store, user.id),
        docs_root,
        commands.clone(),
    );

    let rpc = RpcState::new(commands.clone());
    let bridge_task = tokio::spawn(bridge::serve(bridge_listener, BridgeState { hub, rpc: rpc.clone() }));
    #[cfg(unix)]
    let instance_task = tokio::spawn(crate::rpc::unix::serve_unix(instance_listener, rpc));
    #[cfg(windows)]
    let instance_task = tokio::spawn(crate::rpc::unix::serve_named_pipe(rpc));

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupt received, shutting down");
        let _ = ctrl_c_tx.send(());
    });

    commands.send(AppCommand::Startup { path: file }).await.context("dispatch loop is not accepting commands")?;
    info!(socket_path = %paths.socket_path.display(), "gristdesk started");
    app.run(receiver, shutdown_rx).await;

    bridge_task.abort();
    instance_task.abort();
    Ok(())
}

fn cleanup_paths(paths: &AppPaths) {
    remove_pid_file(&paths.pid_path);
    if let Err(error) = std::fs::remove_file(&paths.credential_path) {
        if error.kind() != std::io::ErrorKind::NotFound {
            warn!(%error, "failed to remove credential file");
        }
    }
    let _ = std::fs::remove_file(&paths.socket_path);
}
