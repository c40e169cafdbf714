// Windows: the host seam, the window <-> document registry, and the bridge host.

pub mod bridge_host;
pub mod host;
pub mod registry;
pub mod urls;
