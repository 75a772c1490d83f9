//! Tracks failing reachability paths: rate-limits outbound reports of our
//! own observed failures, and remembers neighbors' reports within a memory
//! window so send-path selection can avoid paths known to be broken.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::constants::{
    DEFAULT_FAILURE_MEMORY, DEFAULT_FAILURE_REPORT_INTERVAL, DEFAULT_MAX_FAILURES,
    DEFAULT_MAX_PROPAGATION_HOPS,
};
use crate::types::mesh_message::MeshMessage;
use crate::types::peer_id::PeerId;
use crate::types::reachability::ReachabilityPath;

#[derive(Clone, Copy, Debug)]
pub struct PathFailureConfig {
    pub report_interval: Duration,
    pub failure_memory: Duration,
    pub max_failures: usize,
    pub max_propagation_hops: u8,
}

impl Default for PathFailureConfig {
    fn default() -> Self {
        Self {
            report_interval: DEFAULT_FAILURE_REPORT_INTERVAL,
            failure_memory: DEFAULT_FAILURE_MEMORY,
            max_failures: DEFAULT_MAX_FAILURES,
            max_propagation_hops: DEFAULT_MAX_PROPAGATION_HOPS,
        }
    }
}

#[derive(Clone, Debug)]
struct KnownFailure {
    peer_id: PeerId,
    path: ReachabilityPath,
    failed_at: u64,
}

pub struct PathFailureReporter {
    config: PathFailureConfig,
    // Last time *we* reported (peerId, pathHash) outbound, for local rate limiting.
    // Tracked with `Instant` rather than the epoch-second `failed_at` clock so
    // report intervals under a second are still honored instead of truncating away.
    last_reported: Mutex<HashMap<(PeerId, String), Instant>>,
    // Failures known about (ours and relayed-in), keyed by (peerId, pathHash).
    known: Mutex<HashMap<(PeerId, String), KnownFailure>>,
}

impl PathFailureReporter {
    pub fn new(config: PathFailureConfig) -> Self {
        Self {
            config,
            last_reported: Mutex::new(HashMap::new()),
            known: Mutex::new(HashMap::new()),
        }
    }

    /// Report our own observation that `path` failed for `peer_id`. Returns
    /// the outbound message to broadcast, or `None` if the same path was
    /// already reported within the configured interval.
    pub fn report_failure(&self, peer_id: PeerId, path: ReachabilityPath) -> Option<MeshMessage> {
        let key = (peer_id, path.path_hash());
        let instant = Instant::now();
        let mut last_reported = self.last_reported.lock();
        if let Some(&last) = last_reported.get(&key) {
            if instant.duration_since(last) < self.config.report_interval {
                return None;
            }
        }
        last_reported.insert(key.clone(), instant);
        drop(last_reported);

        let now = now_secs();
        self.record_known(peer_id, path.clone(), now);

        Some(MeshMessage::PathFailed {
            peer_id,
            path,
            failed_at: now,
        })
    }

    /// Handle an incoming failure report (ours or relayed). Ignores reports
    /// older than the memory window and dedupes against what is already
    /// known; `reported_by` is accepted for propagation bookkeeping even
    /// though this reporter does not itself decide whether to re-relay.
    pub fn handle_failure(
        &self,
        peer_id: PeerId,
        path: ReachabilityPath,
        failed_at: u64,
        _reported_by: PeerId,
    ) -> bool {
        let now = now_secs();
        if now.saturating_sub(failed_at) > self.config.failure_memory.as_secs() {
            return false;
        }
        let key = (peer_id, path.path_hash());
        {
            let known = self.known.lock();
            if let Some(existing) = known.get(&key) {
                if existing.failed_at >= failed_at {
                    return false;
                }
            }
        }
        self.record_known(peer_id, path, failed_at);
        true
    }

    fn record_known(&self, peer_id: PeerId, path: ReachabilityPath, failed_at: u64) {
        let key = (peer_id, path.path_hash());
        let mut known = self.known.lock();
        known.insert(
            key,
            KnownFailure {
                peer_id,
                path,
                failed_at,
            },
        );
        prune(&mut known, self.config.failure_memory, self.config.max_failures);
    }

    pub fn is_path_failed(&self, peer_id: &PeerId, path: &ReachabilityPath) -> bool {
        let known = self.known.lock();
        match known.get(&(*peer_id, path.path_hash())) {
            Some(failure) => now_secs().saturating_sub(failure.failed_at) <= self.config.failure_memory.as_secs(),
            None => false,
        }
    }

    pub fn failures(&self, peer_id: &PeerId) -> Vec<ReachabilityPath> {
        let known = self.known.lock();
        let window = self.config.failure_memory.as_secs();
        let now = now_secs();
        known
            .values()
            .filter(|f| f.peer_id == *peer_id && now.saturating_sub(f.failed_at) <= window)
            .map(|f| f.path.clone())
            .collect()
    }

    /// Alias kept distinct from [`Self::failures`] per the named query
    /// surface; both are scoped to the memory window.
    pub fn failed_paths(&self, peer_id: &PeerId) -> Vec<ReachabilityPath> {
        self.failures(peer_id)
    }

    pub fn max_propagation_hops(&self) -> u8 {
        self.config.max_propagation_hops
    }
}

fn prune(known: &mut HashMap<(PeerId, String), KnownFailure>, memory: Duration, max: usize) {
    let now = now_secs();
    known.retain(|_, f| now.saturating_sub(f.failed_at) <= memory.as_secs());
    if known.len() > max {
        let mut entries: Vec<((PeerId, String), u64)> =
            known.iter().map(|(k, v)| (k.clone(), v.failed_at)).collect();
        entries.sort_by_key(|(_, failed_at)| *failed_at);
        let excess = entries.len() - max;
        for (key, _) in entries.into_iter().take(excess) {
            known.remove(&key);
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> PeerId {
        PeerId::derive(&[n; 32]).unwrap()
    }

    fn direct(endpoint: &str) -> ReachabilityPath {
        ReachabilityPath::Direct {
            endpoint: endpoint.to_string(),
        }
    }

    #[test]
    fn repeated_immediate_report_yields_nothing() {
        let reporter = PathFailureReporter::new(PathFailureConfig::default());
        let p = peer(1);
        assert!(reporter.report_failure(p, direct("1.2.3.4:9000")).is_some());
        assert!(reporter.report_failure(p, direct("1.2.3.4:9000")).is_none());
    }

    #[test]
    fn report_after_interval_elapses_yields_again() {
        let config = PathFailureConfig {
            report_interval: Duration::from_secs(0),
            ..PathFailureConfig::default()
        };
        let reporter = PathFailureReporter::new(config);
        let p = peer(1);
        assert!(reporter.report_failure(p, direct("1.2.3.4:9000")).is_some());
        std::thread::sleep(Duration::from_millis(1100));
        assert!(reporter.report_failure(p, direct("1.2.3.4:9000")).is_some());
    }

    #[test]
    fn is_path_failed_reflects_recorded_failures() {
        let reporter = PathFailureReporter::new(PathFailureConfig::default());
        let p = peer(1);
        let path = direct("1.2.3.4:9000");
        assert!(!reporter.is_path_failed(&p, &path));
        reporter.report_failure(p, path.clone());
        assert!(reporter.is_path_failed(&p, &path));
    }

    #[test]
    fn handle_failure_ignores_reports_older_than_memory_window() {
        let config = PathFailureConfig {
            failure_memory: Duration::from_secs(60),
            ..PathFailureConfig::default()
        };
        let reporter = PathFailureReporter::new(config);
        let old = now_secs().saturating_sub(120);
        let accepted = reporter.handle_failure(peer(1), direct("1.2.3.4:9000"), old, peer(2));
        assert!(!accepted);
    }

    #[test]
    fn handle_failure_dedupes_against_a_newer_known_report() {
        let reporter = PathFailureReporter::new(PathFailureConfig::default());
        let p = peer(1);
        let path = direct("1.2.3.4:9000");
        let now = now_secs();
        assert!(reporter.handle_failure(p, path.clone(), now, peer(2)));
        assert!(!reporter.handle_failure(p, path, now.saturating_sub(5), peer(3)));
    }

    #[test]
    fn failures_and_failed_paths_agree_and_are_scoped_per_peer() {
        let reporter = PathFailureReporter::new(PathFailureConfig::default());
        let p1 = peer(1);
        let p2 = peer(2);
        reporter.report_failure(p1, direct("1.2.3.4:9000"));
        reporter.report_failure(p2, direct("5.6.7.8:9000"));
        assert_eq!(reporter.failures(&p1).len(), 1);
        assert_eq!(reporter.failed_paths(&p1), reporter.failures(&p1));
        assert_eq!(reporter.failures(&p2).len(), 1);
    }

    #[test]
    fn known_failures_are_capped_at_max_size_oldest_first() {
        let config = PathFailureConfig {
            max_failures: 2,
            ..PathFailureConfig::default()
        };
        let reporter = PathFailureReporter::new(config);
        reporter.handle_failure(peer(1), direct("1.1.1.1:9000"), now_secs(), peer(9));
        reporter.handle_failure(peer(2), direct("2.2.2.2:9000"), now_secs() + 1, peer(9));
        reporter.handle_failure(peer(3), direct("3.3.3.3:9000"), now_secs() + 2, peer(9));
        assert_eq!(reporter.known.lock().len(), 2);
        assert!(!reporter.is_path_failed(&peer(1), &direct("1.1.1.1:9000")));
    }
}
