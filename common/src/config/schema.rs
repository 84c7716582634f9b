use crate::types::ColumnType;
use serde::{Deserialize, Serialize};

/// Top-level, immutable-after-load configuration tree. Constructed once by
/// `load_from_file` and handed to the core as plain data (spec §1,
/// Out-of-scope: "configuration file loading/validation ... is handed to the
/// core as immutable data").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app_name: String,

    pub mysql: MysqlConfig,

    #[serde(default)]
    pub tables: Vec<TableConfig>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub dump: DumpConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Raw, on-disk shape: both the deprecated `server:` table and the current
/// `api:` table may be present simultaneously (spec §9, Open Question).
/// `merge_legacy` resolves them into a single `ApiConfig`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub app_name: String,
    pub mysql: MysqlConfig,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    /// Deprecated alias for `api`. Fields present here apply unless the
    /// matching `api.*` field is also set, in which case `api` wins
    /// regardless of which section came first in the file.
    #[serde(default)]
    pub server: Option<ApiConfig>,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub dump: DumpConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysqlConfig {
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub database: Option<String>,
    /// Non-zero replica identifier; BinlogReader rejects 0 (spec §4.9).
    pub replica_id: u32,
    #[serde(default = "default_reconnect_backoff_min_ms")]
    pub reconnect_backoff_min_ms: u64,
    #[serde(default = "default_reconnect_backoff_max_ms")]
    pub reconnect_backoff_max_ms: u64,
    #[serde(default = "default_state_write_interval_events")]
    pub state_write_interval_events: u64,
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
    #[serde(default = "default_true")]
    pub use_gtid: bool,
}

fn default_mysql_port() -> u16 {
    3306
}
fn default_reconnect_backoff_min_ms() -> u64 {
    500
}
fn default_reconnect_backoff_max_ms() -> u64 {
    30_000
}
fn default_state_write_interval_events() -> u64 {
    1000
}
fn default_event_queue_size() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(FilterOp::Eq),
            "!=" | "<>" => Some(FilterOp::Ne),
            "<" => Some(FilterOp::Lt),
            ">" => Some(FilterOp::Gt),
            "<=" => Some(FilterOp::Le),
            ">=" => Some(FilterOp::Ge),
            "IS NULL" => Some(FilterOp::IsNull),
            "IS NOT NULL" => Some(FilterOp::IsNotNull),
            _ => None,
        }
    }
}

/// A predicate that gates indexing; rows failing it are not stored (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredFilter {
    pub column: String,
    pub column_type: ColumnType,
    pub op: FilterOp,
    #[serde(default)]
    pub value: String,
}

/// A query-time-only filter declaration; the column is stored in the
/// FilterTuple and compared at query time via FILTER clauses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionalFilterDecl {
    pub column: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSource {
    pub columns: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    " ".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub pk_column: String,
    pub text_source: TextSource,
    #[serde(default)]
    pub required_filters: Vec<RequiredFilter>,
    #[serde(default)]
    pub optional_filters: Vec<OptionalFilterDecl>,
    #[serde(default = "default_w_ascii")]
    pub w_ascii: usize,
    /// 0 means "use w_ascii" (spec §3).
    #[serde(default)]
    pub w_cjk: usize,
    #[serde(default)]
    pub posting: PostingEncodingConfig,
}

fn default_w_ascii() -> usize {
    2
}

impl TableConfig {
    pub fn effective_w_cjk(&self) -> usize {
        if self.w_cjk == 0 {
            self.w_ascii
        } else {
            self.w_cjk
        }
    }

    /// Distinct columns referenced by pk, text-source, required and optional
    /// filters, deduplicated preserving first-seen order (spec §4.8, step 2).
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut seen = Vec::new();
        let mut push = |c: &str| {
            if !seen.iter().any(|s: &String| s == c) {
                seen.push(c.to_string());
            }
        };
        push(&self.pk_column);
        for c in &self.text_source.columns {
            push(c);
        }
        for f in &self.required_filters {
            push(&f.column);
        }
        for f in &self.optional_filters {
            push(&f.column);
        }
        seen
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingEncodingConfig {
    #[serde(default = "default_density_threshold")]
    pub density_threshold: f64,
    #[serde(default = "default_hysteresis_ratio")]
    pub hysteresis_ratio: f64,
    #[serde(default = "default_max_sorted_bytes")]
    pub max_sorted_bytes: usize,
}

fn default_density_threshold() -> f64 {
    0.18
}
fn default_hysteresis_ratio() -> f64 {
    0.5
}
fn default_max_sorted_bytes() -> usize {
    64 * 1024
}

impl Default for PostingEncodingConfig {
    fn default() -> Self {
        PostingEncodingConfig {
            density_threshold: default_density_threshold(),
            hysteresis_ratio: default_hysteresis_ratio(),
            max_sorted_bytes: default_max_sorted_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_rate_capacity")]
    pub capacity: u32,
    #[serde(default = "default_rate_refill")]
    pub refill_rate: u32,
}

fn default_rate_capacity() -> u32 {
    1000
}
fn default_rate_refill() -> u32 {
    200
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        RateLimitingConfig {
            enable: false,
            capacity: default_rate_capacity(),
            refill_rate: default_rate_refill(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_tcp_host")]
    pub tcp_host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_submission_queue")]
    pub submission_queue_size: usize,
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    #[serde(default)]
    pub read_only: bool,
}

fn default_tcp_host() -> String {
    "0.0.0.0".to_string()
}
fn default_tcp_port() -> u16 {
    8401
}
fn default_worker_threads() -> usize {
    num_cpus_fallback()
}
fn default_submission_queue() -> usize {
    1000
}
fn default_limit() -> u64 {
    20
}
fn default_max_query_length() -> usize {
    8192
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            tcp_host: default_tcp_host(),
            tcp_port: default_tcp_port(),
            http_port: None,
            worker_threads: default_worker_threads(),
            submission_queue_size: default_submission_queue(),
            default_limit: default_limit(),
            max_query_length: default_max_query_length(),
            rate_limiting: RateLimitingConfig::default(),
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_max_memory_bytes")]
    pub max_memory_bytes: usize,
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_min_query_cost_ms")]
    pub min_query_cost_ms: u64,
}

fn default_cache_max_memory_bytes() -> usize {
    128 * 1024 * 1024
}
fn default_cache_ttl_seconds() -> u64 {
    60
}
fn default_min_query_cost_ms() -> u64 {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            max_memory_bytes: default_cache_max_memory_bytes(),
            ttl_seconds: default_cache_ttl_seconds(),
            min_query_cost_ms: default_min_query_cost_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    #[serde(default = "default_dump_dir")]
    pub dir: String,
    #[serde(default = "default_dump_interval_sec")]
    pub interval_sec: u64,
    #[serde(default = "default_dump_retain")]
    pub retain: usize,
}

fn default_dump_dir() -> String {
    "/var/lib/mygramdb/snapshots".to_string()
}
fn default_dump_interval_sec() -> u64 {
    3600
}
fn default_dump_retain() -> usize {
    3
}

impl Default for DumpConfig {
    fn default() -> Self {
        DumpConfig {
            dir: default_dump_dir(),
            interval_sec: default_dump_interval_sec(),
            retain: default_dump_retain(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// CIDR allowlist, e.g. ["127.0.0.1/32", "10.0.0.0/8"]. Empty means
    /// "allow all" (development default).
    #[serde(default)]
    pub allow_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            dir: None,
        }
    }
}
