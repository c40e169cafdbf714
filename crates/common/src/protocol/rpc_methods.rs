// RPC method name constants for the instance socket and the window bridge.

// ── Instance socket ────────────────────────────────────────────────
pub const RPC_PING: &str = "rpc.ping";
/// A second process instance hands its argv and cwd to the running one.
pub const APP_OPEN: &str = "app.open";
/// The embedded server asks where a document's file lives.
pub const DOC_STORAGE_PATH: &str = "doc.storagePath";

// ── Bridge: window -> app requests ─────────────────────────────────
pub const DOC_CREATE: &str = "doc.create";
pub const DOC_IMPORT: &str = "doc.import";
pub const APP_RECENT_ITEMS: &str = "app.recentItems";

// ── Bridge: window -> app notifications ────────────────────────────
pub const WINDOW_NAVIGATED: &str = "window.navigated";
pub const WINDOW_LOADED: &str = "window.loaded";
pub const WINDOW_CLOSED: &str = "window.closed";
pub const WINDOW_OPEN_URL: &str = "window.openUrl";
/// A file dropped on a window, or handed to the window process by the OS.
pub const APP_OPEN_FILE: &str = "app.openFile";
pub const MENU_FILE_NEW: &str = "menu.fileNew";
pub const MENU_FILE_OPEN: &str = "menu.fileOpen";
pub const MENU_OPEN_RECENT: &str = "menu.openRecent";

// ── Bridge: app -> window pushes ───────────────────────────────────
pub const PUSH_NAVIGATE: &str = "window.navigate";
pub const PUSH_FOCUS: &str = "window.focus";
pub const PUSH_IMPORT_PAYLOAD: &str = "doc.importPayload";
pub const PUSH_ERROR: &str = "app.error";

/// Methods served on the instance socket.
pub const INSTANCE_METHODS: &[&str] = &[RPC_PING, APP_OPEN, DOC_STORAGE_PATH];

/// Methods a window may send over its bridge connection.
pub const BRIDGE_METHODS: &[&str] = &[
    DOC_CREATE,
    DOC_IMPORT,
    APP_RECENT_ITEMS,
    WINDOW_NAVIGATED,
    WINDOW_LOADED,
    WINDOW_CLOSED,
    WINDOW_OPEN_URL,
    APP_OPEN_FILE,
    MENU_FILE_NEW,
    MENU_FILE_OPEN,
    MENU_OPEN_RECENT,
];

/// Messages the app pushes to a window.
pub const PUSH_METHODS: &[&str] = &[PUSH_NAVIGATE, PUSH_FOCUS, PUSH_IMPORT_PAYLOAD, PUSH_ERROR];
