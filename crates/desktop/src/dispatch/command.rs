// Everything the dispatch loop can be asked to do.

use std::path::PathBuf;

use gristdesk_common::types::{DocId, NewDocument, WindowId};
use tokio::sync::{mpsc, oneshot};

use crate::error::DesktopResult;

pub type Reply<T> = oneshot::Sender<T>;
pub type CommandSender = mpsc::Sender<AppCommand>;
pub type CommandReceiver = mpsc::Receiver<AppCommand>;

/// Capacity of the command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

pub fn channel() -> (CommandSender, CommandReceiver) {
    mpsc::channel(COMMAND_CHANNEL_CAPACITY)
}

#[derive(Debug)]
pub enum AppCommand {
    /// The file named on the command line, or a plain home window when there
    /// is none. Falls back to a home window if the file cannot be opened.
    Startup { path: Option<PathBuf> },
    /// A file dropped on a window (`app.openFile`), or any other "open this
    /// file" request from the OS.
    OpenFile { path: PathBuf, requesting: Option<WindowId> },
    MenuFileNew,
    MenuFileOpen { path: PathBuf, requesting: Option<WindowId> },
    OpenRecent { path: PathBuf },
    /// Another process instance was started with these arguments.
    SecondInstance { argv: Vec<String>, cwd: PathBuf },

    WindowNavigated { window: WindowId, url: String },
    WindowLoaded { window: WindowId },
    WindowClosed { window: WindowId },
    /// A page asked to open `url` in a new window.
    WindowOpenUrl { window: WindowId, url: String },

    CreateDoc { window: WindowId, path: Option<PathBuf>, reply: Reply<DesktopResult<Option<NewDocument>>> },
    ImportDoc {
        window: WindowId,
        upload_id: i64,
        path: Option<PathBuf>,
        reply: Reply<DesktopResult<Option<NewDocument>>>,
    },
    /// Completion of the server-side import started by `ImportDoc`.
    ImportFinished {
        doc: NewDocument,
        result: anyhow::Result<()>,
        reply: Reply<DesktopResult<Option<NewDocument>>>,
    },

    StoragePath { doc_id: DocId, reply: Reply<PathBuf> },
    RecentItems { reply: Reply<Vec<String>> },
}

impl AppCommand {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Startup { .. } => "startup",
            Self::OpenFile { .. } => "open_file",
            Self::MenuFileNew => "menu_file_new",
            Self::MenuFileOpen { .. } => "menu_file_open",
            Self::OpenRecent { .. } => "open_recent",
            Self::SecondInstance { .. } => "second_instance",
            Self::WindowNavigated { .. } => "window_navigated",
            Self::WindowLoaded { .. } => "window_loaded",
            Self::WindowClosed { .. } => "window_closed",
            Self::WindowOpenUrl { .. } => "window_open_url",
            Self::CreateDoc { .. } => "create_doc",
            Self::ImportDoc { .. } => "import_doc",
            Self::ImportFinished { .. } => "import_finished",
            Self::StoragePath { .. } => "storage_path",
            Self::RecentItems { .. } => "recent_items",
        }
    }
}
