// Filesystem path helpers shared by the registry and the dispatcher.

pub mod normalize;

pub use normalize::{normalize_path, PathError};
