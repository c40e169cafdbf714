// Subscriber setup: console output filtered by `RUST_LOG` (default `info`),
// plus a debug-level log file when one is requested.
//
// The file is `$GRIST_LOG_PATH`, or `~/grist_debug.log` if it already exists.
// To enable logging: `touch ~/grist_debug.log`. To disable: remove it.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::security::open_private_append;

pub const DEBUG_LOG_NAME: &str = "grist_debug.log";
pub const LOG_PATH_ENV: &str = "GRIST_LOG_PATH";

/// Install the global subscriber. Returns the debug log file in use, if any.
pub fn init() -> Result<Option<PathBuf>> {
    let console = fmt::layer()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let path = debug_log_path(std::env::var_os(LOG_PATH_ENV).map(PathBuf::from), dirs::home_dir().as_deref());
    let file_layer = match &path {
        Some(path) => {
            let file = open_debug_log(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)).with_filter(LevelFilter::DEBUG))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(path)
}

/// Where debug output goes: the explicit path when set, else the default file
/// in `home` if it exists.
pub fn debug_log_path(explicit: Option<PathBuf>, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|path| !path.as_os_str().is_empty()) {
        return Some(path);
    }
    let default = home?.join(DEBUG_LOG_NAME);
    default.is_file().then_some(default)
}

/// Open the debug log for appending and mark the start of this process.
pub fn open_debug_log(path: &Path) -> Result<File> {
    let mut file =
        open_private_append(path).with_context(|| format!("failed to open debug log `{}`", path.display()))?;
    writeln!(file, "--- log starting by pid {} ---", std::process::id())
        .with_context(|| format!("failed to write debug log `{}`", path.display()))?;
    Ok(file)
}
