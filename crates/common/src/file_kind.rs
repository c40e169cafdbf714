// File classification by extension: native documents vs. importable tabular data.

use std::path::Path;

/// Extension (without the dot) of native document files.
pub const NATIVE_EXTENSION: &str = "grist";

/// Extensions accepted for one-shot import when nothing else is configured.
pub const DEFAULT_IMPORTABLE_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "xlsx", "xlsm", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Opened in place and tracked by the path registry.
    Native,
    /// Read once and handed to the home view for import.
    Importable,
}

/// Classify `path` by its extension, case-insensitively.
///
/// `importable` lists extensions without the leading dot. The native extension
/// always wins, even if it also appears in `importable`.
pub fn classify<S: AsRef<str>>(path: &Path, importable: &[S]) -> Option<FileKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == NATIVE_EXTENSION {
        return Some(FileKind::Native);
    }
    importable
        .iter()
        .map(|candidate| candidate.as_ref().trim_start_matches('.'))
        .any(|candidate| candidate.eq_ignore_ascii_case(&ext))
        .then_some(FileKind::Importable)
}

/// Display name of a document backed by `path`: the file name with the native
/// suffix stripped.
pub fn doc_name_from_path(path: &Path) -> String {
    let file_name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let suffix = format!(".{NATIVE_EXTENSION}");
    match file_name.strip_suffix(&suffix) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => file_name,
    }
}
