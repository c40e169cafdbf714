// Process-level startup: app directory, PID file, instance socket.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
#[cfg(unix)]
use tokio::net::UnixListener;
use tracing::info;

use crate::config::app_dir;
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file, open_private_truncate};

/// Instance socket: ~/.gristdesk/instance.sock
const SOCKET_NAME: &str = "instance.sock";
/// PID file: ~/.gristdesk/gristdesk.pid (diagnostics only)
const PID_FILE_NAME: &str = "gristdesk.pid";
/// Session credential shared with the embedded server: ~/.gristdesk/session.key
const CREDENTIAL_FILE_NAME: &str = "session.key";

/// Resolved paths for runtime files.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub credential_path: PathBuf,
}

impl AppPaths {
    /// Resolve paths under `~/.gristdesk/`, creating the directory.
    pub fn resolve() -> Result<Self> {
        let base_dir = app_dir().context("could not determine home directory")?;
        Self::under(base_dir)
    }

    /// Resolve paths under `base_dir`, creating it owner-only.
    pub fn under(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).with_context(|| format!("failed to create `{}`", base_dir.display()))?;
        ensure_owner_only_dir(&base_dir)?;
        Ok(Self {
            socket_path: base_dir.join(SOCKET_NAME),
            pid_path: base_dir.join(PID_FILE_NAME),
            credential_path: base_dir.join(CREDENTIAL_FILE_NAME),
            base_dir,
        })
    }
}

/// Write the current process PID to `path`.
pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file = fs::File::create(path).context("failed to create PID file")?;
    write!(file, "{pid}").context("failed to write PID")?;
    ensure_owner_only_file(path)?;
    info!(pid, path = %path.display(), "wrote PID file");
    Ok(())
}

/// Write the session credential owner-only, replacing any previous one.
pub fn write_credential_file(path: &Path, credential: &str) -> Result<()> {
    let mut file = open_private_truncate(path).context("failed to create credential file")?;
    file.write_all(credential.as_bytes()).context("failed to write credential")?;
    ensure_owner_only_file(path)
}

/// Remove the PID file on shutdown.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, "failed to remove PID file");
        }
    }
}

/// Remove a stale socket file and bind a new listener. Only call this once
/// [`is_instance_running`] said no other instance answers.
#[cfg(unix)]
pub async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        fs::remove_file(path).context("failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(path).context("failed to bind instance socket")?;
    info!(path = %path.display(), "instance socket ready");
    Ok(listener)
}

/// Whether another instance accepts connections on `socket_path`.
#[cfg(unix)]
pub async fn is_instance_running(socket_path: &Path) -> bool {
    tokio::net::UnixStream::connect(socket_path).await.is_ok()
}

#[cfg(not(unix))]
pub async fn is_instance_running(_socket_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(tmp: &TempDir) -> AppPaths {
        AppPaths::under(tmp.path().join("app")).unwrap()
    }

    #[test]
    fn resolves_files_under_base_dir() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        assert!(paths.base_dir.is_dir());
        assert_eq!(paths.socket_path, paths.base_dir.join("instance.sock"));
        assert_eq!(paths.pid_path, paths.base_dir.join("gristdesk.pid"));
    }

    #[test]
    fn write_and_remove_pid_file() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);

        write_pid_file(&paths.pid_path).unwrap();
        let pid: u32 = fs::read_to_string(&paths.pid_path).unwrap().parse().unwrap();
        assert_eq!(pid, std::process::id());

        remove_pid_file(&paths.pid_path);
        assert!(!paths.pid_path.exists());
        // Second removal is a no-op.
        remove_pid_file(&paths.pid_path);
    }

    #[test]
    fn credential_file_is_replaced_not_appended() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        write_credential_file(&paths.credential_path, "first-credential").unwrap();
        write_credential_file(&paths.credential_path, "second").unwrap();
        assert_eq!(fs::read_to_string(&paths.credential_path).unwrap(), "second");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bind_replaces_stale_socket_and_reports_running() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        fs::write(&paths.socket_path, b"stale").unwrap();
        assert!(!is_instance_running(&paths.socket_path).await);

        let listener = match bind_socket(&paths.socket_path).await {
            Ok(listener) => listener,
            Err(error) => {
                eprintln!("skipping unix socket test: {error:#}");
                return;
            }
        };
        assert!(is_instance_running(&paths.socket_path).await);
        drop(listener);
    }
}
