use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, info, trace};
use serde::Deserialize;

use stowage_backend::TailscalePeer;
use stowage_platform::{CommandOutcome, CommandRunner, CommandSpec, SystemRunner};

use crate::error::DiscoveryError;
use crate::rank::{dedup_by_hostname, rank_peers};

const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const KIB_PER_GIB: u64 = 1024 * 1024;

const NOT_CONNECTED_MARKERS: [&str; 4] = ["stopped", "logged out", "needslogin", "not running"];

#[derive(Debug, Clone, PartialEq)]
pub enum Discovery {
    NotConnected,
    Connected(Vec<TailscalePeer>),
}

impl Discovery {
    #[must_use]
    pub fn into_peers(self) -> Vec<TailscalePeer> {
        match self {
            Self::NotConnected => Vec::new(),
            Self::Connected(peers) => peers,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Status {
    backend_state: String,
    #[serde(default)]
    peer: Option<BTreeMap<String, PeerStatus>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PeerStatus {
    #[serde(default)]
    host_name: String,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
    #[serde(default)]
    online: bool,
    #[serde(rename = "OS", default)]
    os: String,
}

/// Parse `tailscale status --json`. Peers are returned unenriched, in
/// hostname order, deduplicated.
///
/// # Errors
/// Returns an error if the document is not valid status JSON.
pub fn parse_status(json: &str) -> Result<Discovery, DiscoveryError> {
    let status: Status = serde_json::from_str(json)?;
    if status.backend_state != "Running" {
        debug!("tailscale backend state is {}", status.backend_state);
        return Ok(Discovery::NotConnected);
    }

    let mut peers: Vec<TailscalePeer> = status
        .peer
        .unwrap_or_default()
        .into_values()
        .filter(|peer| !peer.host_name.is_empty())
        .map(|peer| {
            let ip = peer
                .tailscale_ips
                .iter()
                .find(|ip| ip.contains('.'))
                .or_else(|| peer.tailscale_ips.first())
                .cloned()
                .unwrap_or_default();
            TailscalePeer {
                os: peer.os,
                ..TailscalePeer::new(peer.host_name, ip, peer.online)
            }
        })
        .collect();
    peers.sort_by(|a, b| a.hostname.cmp(&b.hostname));

    Ok(Discovery::Connected(dedup_by_hostname(peers)))
}

fn parse_ping_latency(output: &str) -> Option<f64> {
    output
        .lines()
        .filter(|line| line.starts_with("pong"))
        .find_map(|line| line.rsplit_once(" in ")?.1.trim().strip_suffix("ms")?.parse().ok())
}

fn parse_df_free_gb(output: &str) -> Option<u64> {
    let available_kib: u64 = output
        .lines()
        .nth(1)?
        .split_whitespace()
        .nth(3)?
        .parse()
        .ok()?;
    Some(available_kib / KIB_PER_GIB)
}

#[derive(Clone)]
pub struct PeerDiscovery {
    runner: Arc<dyn CommandRunner>,
}

impl Default for PeerDiscovery {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

impl PeerDiscovery {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Query connectivity and peers, enrich online peers and rank them.
    ///
    /// # Errors
    /// Returns an error if `tailscale status` cannot be run, times out, or
    /// prints something that is neither status JSON nor a known
    /// not-connected message.
    pub async fn discover(&self) -> Result<Discovery, DiscoveryError> {
        let spec = CommandSpec::new("tailscale", STATUS_TIMEOUT).args(["status", "--json"]);

        let discovery = match self.runner.run(&spec).await {
            CommandOutcome::Completed(output) if output.success() => parse_status(&output.stdout)?,
            CommandOutcome::Completed(output) => {
                let text = output.combined();
                let lowered = text.to_ascii_lowercase();
                if NOT_CONNECTED_MARKERS.iter().any(|m| lowered.contains(m)) {
                    Discovery::NotConnected
                } else {
                    return Err(DiscoveryError::CommandFailed { stderr: text });
                }
            }
            CommandOutcome::TimedOut { .. } => return Err(DiscoveryError::Timeout),
            CommandOutcome::SpawnFailed { kind, .. } if kind == std::io::ErrorKind::NotFound => {
                return Err(DiscoveryError::NotInstalled);
            }
            CommandOutcome::SpawnFailed { message, .. } => {
                return Err(DiscoveryError::IoError(message));
            }
        };

        let Discovery::Connected(peers) = discovery else {
            info!("Tailscale is not connected");
            return Ok(Discovery::NotConnected);
        };

        let mut peers = join_all(peers.into_iter().map(|peer| self.enrich(peer))).await;
        rank_peers(&mut peers);
        info!(
            "Discovered {} peers ({} online)",
            peers.len(),
            peers.iter().filter(|p| p.online).count()
        );
        Ok(Discovery::Connected(peers))
    }

    /// Ranked peers; an unconnected client yields an empty list.
    ///
    /// # Errors
    /// See [`PeerDiscovery::discover`].
    pub async fn list_peers(&self) -> Result<Vec<TailscalePeer>, DiscoveryError> {
        self.discover().await.map(Discovery::into_peers)
    }

    async fn enrich(&self, mut peer: TailscalePeer) -> TailscalePeer {
        if !peer.online {
            return peer;
        }
        let (latency, free) = futures_util::join!(self.ping(&peer), self.free_space(&peer));
        peer.latency_ms = latency;
        peer.free_space_gb = free;
        trace!(
            "Enriched {}: latency={:?} free={:?}",
            peer.hostname, peer.latency_ms, peer.free_space_gb
        );
        peer
    }

    async fn ping(&self, peer: &TailscalePeer) -> Option<f64> {
        let spec = CommandSpec::new("tailscale", PROBE_TIMEOUT).args([
            "ping",
            "-c",
            "1",
            peer.hostname.as_str(),
        ]);
        let outcome = self.runner.run(&spec).await;
        let latency = outcome.stdout().and_then(parse_ping_latency);
        if latency.is_none() {
            debug!("Ping to {} failed: {}", peer.hostname, outcome.describe());
        }
        latency
    }

    async fn free_space(&self, peer: &TailscalePeer) -> Option<u64> {
        let target = if peer.ip.is_empty() {
            peer.hostname.as_str()
        } else {
            peer.ip.as_str()
        };
        let spec = CommandSpec::new("ssh", PROBE_TIMEOUT).args([
            "-o",
            "BatchMode=yes",
            "-o",
            "ConnectTimeout=5",
            target,
            "df",
            "-Pk",
            "/",
        ]);
        let outcome = self.runner.run(&spec).await;
        let free = outcome.stdout().and_then(parse_df_free_gb);
        if free.is_none() {
            debug!("Free space probe on {} failed: {}", peer.hostname, outcome.describe());
        }
        free
    }
}
