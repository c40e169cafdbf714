// gristdesk-common: shared types and utilities for the gristdesk workspace

pub mod file_kind;
pub mod path;
pub mod protocol;
pub mod types;
