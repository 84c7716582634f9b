use crate::admission::AdmissionGates;
use crate::meminfo::MemoryHealth;
use crate::rate_limit::RateLimiterHandle;
use crate::replication_control::ReplicationControl;
use crate::stats::ServerStats;
use crate::variables::{MysqlEndpoint, RuntimeVariableRegistry, VariableTargets};
use crate::worker_pool::WorkerPool;
use common::config::{Config, DumpConfig};
use docstore::table_context::TableContext;
use query::ResultCache;
use replication::SyncCoordinator;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Everything a command handler needs to serve one request, shared across
/// every connection and the HTTP surface alike (spec §2, §4.11-§4.13). Built
/// once at startup by the orchestrator and handed out as an `Arc`.
pub struct HandlerCtx {
    pub app_name: String,
    pub tables: HashMap<String, Arc<TableContext>>,
    pub cache: Arc<ResultCache>,
    pub variables: RuntimeVariableRegistry,
    pub variable_targets: VariableTargets,
    pub sync_coordinator: Arc<SyncCoordinator>,
    pub replication: Arc<ReplicationControl>,
    pub admission: Arc<AdmissionGates>,
    pub stats: Arc<ServerStats>,
    pub rate_limiter: Arc<RateLimiterHandle>,
    pub worker_pool: WorkerPool,
    pub default_limit: Arc<AtomicU64>,
    pub max_query_length: Arc<AtomicUsize>,
    pub min_query_cost_ms: AtomicU64,
    pub dump: DumpConfig,
    pub memory_warning_at: f64,
    pub memory_critical_at: f64,
    pub started_at: Instant,
}

impl HandlerCtx {
    /// Assembles the shared context from loaded config and the already
    /// constructed per-table stores (spec §2, §4.1). `mysql_endpoint` and
    /// `replication` are wired separately since they outlive a single
    /// config reload via `SET mysql.host`/`SET mysql.port`.
    pub fn new(
        config: &Config,
        tables: HashMap<String, Arc<TableContext>>,
        replication: Arc<ReplicationControl>,
        admission: Arc<AdmissionGates>,
        worker_pool: WorkerPool,
    ) -> Self {
        let cache = Arc::new(ResultCache::new(config.cache.max_memory_bytes, config.cache.ttl_seconds));
        if !config.cache.enabled {
            cache.disable();
        }

        let rate_limiter = Arc::new(RateLimiterHandle::new(
            config.api.rate_limiting.enable,
            config.api.rate_limiting.capacity,
            config.api.rate_limiting.refill_rate,
        ));

        let mysql_endpoint = Arc::new(MysqlEndpoint::new(config.mysql.host.clone(), config.mysql.port));
        let default_limit = Arc::new(AtomicU64::new(config.api.default_limit));
        let max_query_length = Arc::new(AtomicUsize::new(config.api.max_query_length));

        let variable_targets = VariableTargets {
            cache: cache.clone(),
            rate_limiter: rate_limiter.clone(),
            default_limit: default_limit.clone(),
            max_query_length: max_query_length.clone(),
            mysql_endpoint,
            rate_limit_enabled: Arc::new(AtomicBool::new(config.api.rate_limiting.enable)),
            rate_limit_capacity: Arc::new(AtomicU64::new(config.api.rate_limiting.capacity as u64)),
            rate_limit_refill: Arc::new(AtomicU64::new(config.api.rate_limiting.refill_rate as u64)),
        };

        let initial_values = initial_variable_values(config);

        let sync_coordinator = Arc::new(SyncCoordinator::new());
        let restart_target = replication.clone();
        sync_coordinator.set_restart_hook(Arc::new(move || restart_target.restart()));

        HandlerCtx {
            app_name: config.app_name.clone(),
            tables,
            cache,
            variables: RuntimeVariableRegistry::new(initial_values),
            variable_targets,
            sync_coordinator,
            replication,
            admission,
            stats: Arc::new(ServerStats::new()),
            rate_limiter,
            worker_pool,
            default_limit,
            max_query_length,
            min_query_cost_ms: AtomicU64::new(config.cache.min_query_cost_ms),
            dump: config.dump.clone(),
            memory_warning_at: 0.80,
            memory_critical_at: 0.95,
            started_at: Instant::now(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableContext>> {
        self.tables.get(name)
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit.load(Ordering::SeqCst)
    }

    pub fn max_query_length(&self) -> usize {
        self.max_query_length.load(Ordering::SeqCst)
    }

    pub fn min_query_cost_ms(&self) -> u64 {
        self.min_query_cost_ms.load(Ordering::SeqCst)
    }

    pub fn memory_health(&self) -> MemoryHealth {
        let snap = crate::meminfo::read();
        let health = MemoryHealth::classify(snap.usage_ratio(), self.memory_warning_at, self.memory_critical_at);
        self.admission.memory_critical.store(health == MemoryHealth::Critical, Ordering::SeqCst);
        health
    }
}

fn initial_variable_values(config: &Config) -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert("logging.level".to_string(), config.logging.level.clone());
    values.insert("logging.format".to_string(), config.logging.format.clone());
    values.insert("mysql.host".to_string(), config.mysql.host.clone());
    values.insert("mysql.port".to_string(), config.mysql.port.to_string());
    values.insert("api.default_limit".to_string(), config.api.default_limit.to_string());
    values.insert("api.max_query_length".to_string(), config.api.max_query_length.to_string());
    values.insert("api.rate_limiting.enable".to_string(), config.api.rate_limiting.enable.to_string());
    values.insert("api.rate_limiting.capacity".to_string(), config.api.rate_limiting.capacity.to_string());
    values.insert("api.rate_limiting.refill_rate".to_string(), config.api.rate_limiting.refill_rate.to_string());
    values.insert("cache.enabled".to_string(), config.cache.enabled.to_string());
    values.insert("cache.min_query_cost_ms".to_string(), config.cache.min_query_cost_ms.to_string());
    values.insert("cache.ttl_seconds".to_string(), config.cache.ttl_seconds.to_string());
    values.insert("api.tcp_port".to_string(), config.api.tcp_port.to_string());
    values.insert("api.worker_threads".to_string(), config.api.worker_threads.to_string());
    values.insert("mysql.replica_id".to_string(), config.mysql.replica_id.to_string());
    values.insert("dump.dir".to_string(), config.dump.dir.clone());
    values.insert("dump.interval_sec".to_string(), config.dump.interval_sec.to_string());
    values
}

/// Per-connection state: the `DEBUG ON/OFF` toggle and the peer address
/// surfaced by `INFO`'s client list (spec §4.11, §6).
pub struct ConnectionCtx {
    pub peer_addr: SocketAddr,
    pub debug: AtomicBool,
}

impl ConnectionCtx {
    pub fn new(peer_addr: SocketAddr) -> Self {
        ConnectionCtx { peer_addr, debug: AtomicBool::new(false) }
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::SeqCst);
    }
}
