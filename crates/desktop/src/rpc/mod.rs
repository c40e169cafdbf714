// JSON-RPC: the instance socket and the per-window WebSocket bridge.

pub mod bridge;
pub mod methods;
pub mod unix;
