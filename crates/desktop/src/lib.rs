// gristdesk-desktop library entry point: document identity and window
// lifecycle for the desktop shell.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod registry;
pub mod rpc;
pub mod runtime;
pub mod security;
pub mod startup;
pub mod store;
pub mod window;
