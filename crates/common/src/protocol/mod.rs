// Wire protocol shared by the instance socket and the window bridge.

pub mod bridge;
pub mod jsonrpc;
pub mod rpc_methods;
