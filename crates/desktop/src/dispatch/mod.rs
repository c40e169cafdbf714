// Dispatch: the command vocabulary, the open-file router, recent items and
// the loop that owns the registries.

pub mod app;
pub mod command;
pub mod open;
pub mod recent;
