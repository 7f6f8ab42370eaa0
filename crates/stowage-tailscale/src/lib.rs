mod backend;
mod connect;
mod discovery;
mod error;
mod rank;

pub use backend::{HOST, IP, MeshPeerBackend, SSH_KEY_FILE, SSH_USER};
pub use connect::{TailscaleConnectHook, extract_auth_url};
pub use discovery::{Discovery, PeerDiscovery, parse_status};
pub use error::DiscoveryError;
pub use rank::{dedup_by_hostname, rank_peers};

#[cfg(test)]
mod fake;
