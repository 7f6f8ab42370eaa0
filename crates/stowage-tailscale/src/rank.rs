use std::cmp::Ordering;
use std::collections::HashMap;

use stowage_backend::TailscalePeer;

/// Keep one entry per hostname. An online entry replaces an offline one;
/// otherwise the first occurrence wins.
#[must_use]
pub fn dedup_by_hostname(peers: Vec<TailscalePeer>) -> Vec<TailscalePeer> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<TailscalePeer> = Vec::with_capacity(peers.len());

    for peer in peers {
        match index.get(&peer.hostname) {
            Some(&at) => {
                if peer.online && !unique[at].online {
                    unique[at] = peer;
                }
            }
            None => {
                index.insert(peer.hostname.clone(), unique.len());
                unique.push(peer);
            }
        }
    }
    unique
}

/// Online before offline, then ascending latency with unmeasured peers last,
/// then hostname.
pub fn rank_peers(peers: &mut [TailscalePeer]) {
    peers.sort_by(compare);
}

fn compare(a: &TailscalePeer, b: &TailscalePeer) -> Ordering {
    b.online
        .cmp(&a.online)
        .then_with(|| match (a.latency_ms, b.latency_ms) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.hostname.cmp(&b.hostname))
}

#[cfg(test)]
mod tests {
    use stowage_backend::TailscalePeer;

    use super::{dedup_by_hostname, rank_peers};

    fn peer(hostname: &str, online: bool, latency_ms: Option<f64>) -> TailscalePeer {
        TailscalePeer {
            latency_ms,
            ..TailscalePeer::new(hostname, "100.64.0.1", online)
        }
    }

    fn names(peers: &[TailscalePeer]) -> Vec<&str> {
        peers.iter().map(|p| p.hostname.as_str()).collect()
    }

    #[test]
    fn online_peers_sort_first_regardless_of_latency() {
        let mut peers = vec![
            peer("offline-fast", false, Some(1.0)),
            peer("online-slow", true, Some(250.0)),
            peer("online-unmeasured", true, None),
            peer("online-fast", true, Some(12.5)),
        ];

        rank_peers(&mut peers);

        assert_eq!(
            names(&peers),
            vec!["online-fast", "online-slow", "online-unmeasured", "offline-fast"]
        );
    }

    #[test]
    fn ranking_is_idempotent() {
        let mut peers = vec![
            peer("c", true, None),
            peer("b", true, None),
            peer("a", false, None),
            peer("d", true, Some(3.0)),
        ];

        rank_peers(&mut peers);
        let once = peers.clone();
        rank_peers(&mut peers);

        assert_eq!(peers, once);
        assert_eq!(names(&peers), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn dedup_prefers_online_entry() {
        let peers = vec![
            peer("nas", false, None),
            peer("laptop", true, None),
            peer("nas", true, None),
            peer("laptop", false, None),
        ];

        let unique = dedup_by_hostname(peers);

        assert_eq!(names(&unique), vec!["nas", "laptop"]);
        assert!(unique.iter().all(|p| p.online));
    }
}
