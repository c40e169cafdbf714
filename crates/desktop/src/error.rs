// Error taxonomy for open/create operations. Every path-bearing variant names
// the offending file so the message can be shown to the user as is.

use std::path::PathBuf;

use thiserror::Error;

pub type DesktopResult<T> = std::result::Result<T, DesktopError>;

#[derive(Debug, Error)]
pub enum DesktopError {
    #[error("{}: unsupported file format", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("{}: file not found", path.display())]
    FileNotFound { path: PathBuf },

    #[error("{}: cannot read file: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: document registry is out of sync with the home database, please restart the app", path.display())]
    RegistryInconsistency { path: PathBuf },

    #[error("{}: location is not writable", path.display())]
    PathNotWritable { path: PathBuf },

    #[error("{}: file already exists", path.display())]
    PathAlreadyExists { path: PathBuf },

    #[error("{}: invalid path: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("cannot find default user `{email}` in the home database")]
    MissingDefaultUser { email: String },

    #[error("home database error: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("window host error: {0:#}")]
    Host(#[source] anyhow::Error),

    #[error("document server error: {0:#}")]
    Server(#[source] anyhow::Error),
}

impl DesktopError {
    /// Stable machine-readable code, sent to windows alongside the message.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::FileUnreadable { .. } => "FILE_UNREADABLE",
            Self::RegistryInconsistency { .. } => "REGISTRY_INCONSISTENCY",
            Self::PathNotWritable { .. } => "PATH_NOT_WRITABLE",
            Self::PathAlreadyExists { .. } => "PATH_ALREADY_EXISTS",
            Self::InvalidPath { .. } => "INVALID_PATH",
            Self::MissingDefaultUser { .. } => "MISSING_DEFAULT_USER",
            Self::Store(_) => "STORE_ERROR",
            Self::Host(_) => "HOST_ERROR",
            Self::Server(_) => "SERVER_ERROR",
        }
    }

    /// Title for the blocking error dialog.
    pub fn title(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "Unsupported file",
            Self::FileNotFound { .. } | Self::FileUnreadable { .. } => "Cannot open file",
            Self::RegistryInconsistency { .. } => "Please restart",
            Self::PathNotWritable { .. } | Self::PathAlreadyExists { .. } | Self::InvalidPath { .. } => {
                "Cannot save here"
            }
            Self::MissingDefaultUser { .. } => "Configuration error",
            Self::Store(_) | Self::Host(_) | Self::Server(_) => "Error",
        }
    }
}
