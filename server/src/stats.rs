use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free counters surfaced by `INFO`'s `# Stats`, `# Commandstats`, and
/// `# Clients` sections (spec §6). Mirrors the per-table `ReplicationCounters`
/// shape in `replication::applier`: plain atomics, no lock of their own.
pub struct ServerStats {
    started_at: Instant,
    total_commands_processed: AtomicU64,
    total_requests: AtomicU64,
    connected_clients: AtomicI64,
    rejected_ip_disallowed: AtomicU64,
    rejected_queue_full: AtomicU64,
    rejected_rate_limited: AtomicU64,
    per_command: DashMap<String, AtomicU64>,
}

impl Default for ServerStats {
    fn default() -> Self {
        ServerStats {
            started_at: Instant::now(),
            total_commands_processed: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            connected_clients: AtomicI64::new(0),
            rejected_ip_disallowed: AtomicU64::new(0),
            rejected_queue_full: AtomicU64::new(0),
            rejected_rate_limited: AtomicU64::new(0),
            per_command: DashMap::new(),
        }
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn record_connection_accepted(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connected_clients.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_rejected_ip(&self) {
        self.rejected_ip_disallowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_queue_full(&self) {
        self.rejected_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_rate_limited(&self) {
        self.rejected_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self, kind: &str) {
        self.total_commands_processed.fetch_add(1, Ordering::Relaxed);
        self.per_command.entry(kind.to_string()).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_commands_processed(&self) -> u64 {
        self.total_commands_processed.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn connected_clients(&self) -> i64 {
        self.connected_clients.load(Ordering::Relaxed)
    }

    /// `(command, count)` pairs in descending count order, for `# Commandstats`.
    pub fn command_counts(&self) -> Vec<(String, u64)> {
        let mut out: Vec<(String, u64)> =
            self.per_command.iter().map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed))).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn rejection_counts(&self) -> (u64, u64, u64) {
        (
            self.rejected_ip_disallowed.load(Ordering::Relaxed),
            self.rejected_queue_full.load(Ordering::Relaxed),
            self.rejected_rate_limited.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tracks_commands_and_clients() {
        let stats = ServerStats::new();
        stats.record_connection_accepted();
        stats.record_command("SEARCH");
        stats.record_command("SEARCH");
        stats.record_command("COUNT");

        assert_eq!(stats.connected_clients(), 1);
        assert_eq!(stats.total_commands_processed(), 3);
        let counts = stats.command_counts();
        assert_eq!(counts[0], ("SEARCH".to_string(), 2));

        stats.record_connection_closed();
        assert_eq!(stats.connected_clients(), 0);
    }
}
