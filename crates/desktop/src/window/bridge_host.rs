// WindowHost that launches an external window process per window and talks
// to the page over a per-window WebSocket bridge.
//
// Each window gets its id and the bridge address as query parameters. Pushes
// for a window that has not connected yet are queued and flushed on connect.

use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use gristdesk_common::protocol::bridge::{ErrorPush, ImportPayloadPush, UrlParams};
use gristdesk_common::protocol::jsonrpc::Notification;
use gristdesk_common::protocol::rpc_methods::{PUSH_ERROR, PUSH_FOCUS, PUSH_IMPORT_PAYLOAD, PUSH_NAVIGATE};
use gristdesk_common::types::{ImportPayload, WindowId};
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use super::host::WindowHost;
use crate::dispatch::command::{AppCommand, CommandSender};

/// Query parameter telling the page which window it is.
pub const WINDOW_PARAM: &str = "desktop_window";
/// Query parameter with the bridge WebSocket URL.
pub const BRIDGE_PARAM: &str = "desktop_bridge";
/// Placeholder replaced by the target URL in launcher argv templates.
pub const URL_PLACEHOLDER: &str = "{url}";

// ── Bridge hub ─────────────────────────────────────────────────────

#[derive(Default)]
struct Slot {
    sender: Option<mpsc::UnboundedSender<Notification>>,
    backlog: VecDeque<Notification>,
    // Bumped on every attach, so a stale socket cannot detach its successor.
    generation: u64,
}

pub struct BridgeAttachment {
    pub generation: u64,
    pub pushes: mpsc::UnboundedReceiver<Notification>,
}

/// Per-window push channels, shared between the host and the bridge server.
#[derive(Clone, Default)]
pub struct BridgeHub {
    slots: Arc<Mutex<HashMap<WindowId, Slot>>>,
}

impl BridgeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, window: WindowId) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.entry(window).or_default();
        }
    }

    pub fn remove(&self, window: WindowId) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&window);
        }
    }

    pub fn is_known(&self, window: WindowId) -> bool {
        self.slots.lock().map(|slots| slots.contains_key(&window)).unwrap_or(false)
    }

    /// Connect a bridge socket to `window`, replacing any previous one.
    /// Queued pushes are delivered first. `None` for unknown windows.
    pub fn attach(&self, window: WindowId) -> Option<BridgeAttachment> {
        let mut slots = self.slots.lock().ok()?;
        let slot = slots.get_mut(&window)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        for queued in slot.backlog.drain(..) {
            let _ = sender.send(queued);
        }
        slot.sender = Some(sender);
        slot.generation += 1;
        Some(BridgeAttachment { generation: slot.generation, pushes: receiver })
    }

    /// Disconnect the socket that attached as `generation`.
    pub fn detach(&self, window: WindowId, generation: u64) {
        if let Ok(mut slots) = self.slots.lock() {
            if let Some(slot) = slots.get_mut(&window).filter(|slot| slot.generation == generation) {
                slot.sender = None;
            }
        }
    }

    pub fn push(&self, window: WindowId, notification: Notification) -> Result<()> {
        let mut slots = self.slots.lock().map_err(|_| anyhow!("bridge hub lock poisoned"))?;
        let Some(slot) = slots.get_mut(&window) else {
            bail!("no bridge for {window}");
        };
        let undelivered = match &slot.sender {
            Some(sender) => match sender.send(notification) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(notification)) => notification,
            },
            None => notification,
        };
        slot.sender = None;
        slot.backlog.push_back(undelivered);
        Ok(())
    }
}

// ── Host ───────────────────────────────────────────────────────────

pub struct BridgeWindowHost {
    hub: BridgeHub,
    commands: CommandSender,
    launcher: Vec<String>,
    opener: Vec<String>,
    bridge_base: Url,
    track_exit: bool,
    next_id: u64,
}

impl BridgeWindowHost {
    /// `launcher` and `opener` are argv templates containing [`URL_PLACEHOLDER`].
    /// With `track_exit`, a launcher process exiting closes its window.
    pub fn new(
        hub: BridgeHub,
        commands: CommandSender,
        launcher: Vec<String>,
        opener: Vec<String>,
        bridge_base: Url,
        track_exit: bool,
    ) -> Self {
        Self { hub, commands, launcher, opener, bridge_base, track_exit, next_id: 0 }
    }

    fn window_url(&self, window: WindowId, url: &Url) -> Url {
        let mut bridge = self.bridge_base.clone();
        if let Ok(mut segments) = bridge.path_segments_mut() {
            segments.pop_if_empty().push(&window.0.to_string());
        }
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair(WINDOW_PARAM, &window.0.to_string())
            .append_pair(BRIDGE_PARAM, bridge.as_str());
        url
    }

    fn push<T: Serialize>(&self, window: WindowId, method: &str, params: Option<&T>) -> Result<()> {
        let params = params.map(serde_json::to_value).transpose().context("failed to encode push")?;
        self.hub.push(window, Notification::new(method, params))
    }
}

impl WindowHost for BridgeWindowHost {
    fn create_window(&mut self, url: &Url) -> Result<WindowId> {
        self.next_id += 1;
        let window = WindowId(self.next_id);
        let target = self.window_url(window, url);
        self.hub.register(window);

        let mut child = match spawn_template(&self.launcher, &target) {
            Ok(child) => child,
            Err(error) => {
                self.hub.remove(window);
                return Err(error.context("failed to launch window"));
            }
        };
        info!(window = %window, url = %url, "launched window process");

        if self.track_exit {
            let commands = self.commands.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => debug!(window = %window, %status, "window process exited"),
                    Err(error) => warn!(window = %window, ?error, "failed to wait for window process"),
                }
                let _ = commands.send(AppCommand::WindowClosed { window }).await;
            });
        }
        Ok(window)
    }

    fn navigate(&mut self, window: WindowId, url: &Url) -> Result<()> {
        let url = self.window_url(window, url);
        self.push(window, PUSH_NAVIGATE, Some(&UrlParams { url: url.to_string() }))
    }

    fn focus(&mut self, window: WindowId) -> Result<()> {
        self.push::<()>(window, PUSH_FOCUS, None)
    }

    fn deliver_import(&mut self, window: WindowId, payload: ImportPayload) -> Result<()> {
        let push = ImportPayloadPush {
            file_name: payload.file_name,
            contents_b64: base64::engine::general_purpose::STANDARD.encode(&payload.contents),
        };
        self.push(window, PUSH_IMPORT_PAYLOAD, Some(&push))
    }

    fn show_error(&mut self, window: Option<WindowId>, title: &str, message: &str) {
        error!(window = ?window.map(|window| window.0), title, message, "error shown to user");
        let Some(window) = window else {
            return;
        };
        let push = ErrorPush { title: title.to_string(), message: message.to_string() };
        if let Err(error) = self.push(window, PUSH_ERROR, Some(&push)) {
            warn!(window = %window, error = %format!("{error:#}"), "failed to deliver error to window");
        }
    }

    fn open_external(&mut self, url: &Url) -> Result<()> {
        info!(url = %url, "opening in system browser");
        spawn_template(&self.opener, url).map(drop).context("failed to open system browser")
    }

    fn release(&mut self, window: WindowId) {
        self.hub.remove(window);
    }
}

fn spawn_template(template: &[String], url: &Url) -> Result<tokio::process::Child> {
    let Some((program, args)) = template.split_first() else {
        bail!("launcher command is empty");
    };
    let args: Vec<String> = args.iter().map(|arg| arg.replace(URL_PLACEHOLDER, url.as_str())).collect();
    Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn `{program}`"))
}

/// Platform command that opens a URL with the default handler.
pub fn default_opener() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["open", URL_PLACEHOLDER]
    } else if cfg!(windows) {
        &["cmd", "/C", "start", "", URL_PLACEHOLDER]
    } else {
        &["xdg-open", URL_PLACEHOLDER]
    };
    argv.iter().map(|arg| arg.to_string()).collect()
}
