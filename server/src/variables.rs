use crate::rate_limit::RateLimiterHandle;
use common::error::{MygramError, MygramResult};
use query::ResultCache;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// The live MySQL host/port the next reconnect attempt will use, updated by
/// `SET mysql.host=...` / `SET mysql.port=...` (spec §4.9, "Failover").
/// `BinlogReader` itself is spawned with a snapshot of `MysqlConfig`, so a
/// failover takes effect the next time the reader transitions through
/// `Starting` rather than mutating a connection in flight.
pub struct MysqlEndpoint {
    pub host: RwLock<String>,
    pub port: AtomicU16,
}

impl MysqlEndpoint {
    pub fn new(host: String, port: u16) -> Self {
        MysqlEndpoint { host: RwLock::new(host), port: AtomicU16::new(port) }
    }

    pub fn current(&self) -> (String, u16) {
        (self.host.read().expect("mysql endpoint lock poisoned").clone(), self.port.load(Ordering::SeqCst))
    }
}

/// Handles the variables `SET`/`SHOW VARIABLES` can actually change (spec
/// §4.12, Catalog). Kept as a flat struct of shared handles rather than
/// stored closures, so there is no cyclic ownership between the registry and
/// the server state it mutates.
pub struct VariableTargets {
    pub cache: Arc<ResultCache>,
    pub rate_limiter: Arc<RateLimiterHandle>,
    pub default_limit: Arc<AtomicU64>,
    pub max_query_length: Arc<AtomicUsize>,
    pub mysql_endpoint: Arc<MysqlEndpoint>,
    pub rate_limit_enabled: Arc<std::sync::atomic::AtomicBool>,
    pub rate_limit_capacity: Arc<AtomicU64>,
    pub rate_limit_refill: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Bool,
    U64,
    String,
}

#[derive(Debug, Clone, Copy)]
struct VarSpec {
    name: &'static str,
    var_type: VarType,
    mutable: bool,
}

const CATALOG: &[VarSpec] = &[
    VarSpec { name: "logging.level", var_type: VarType::String, mutable: true },
    VarSpec { name: "logging.format", var_type: VarType::String, mutable: true },
    VarSpec { name: "mysql.host", var_type: VarType::String, mutable: true },
    VarSpec { name: "mysql.port", var_type: VarType::U64, mutable: true },
    VarSpec { name: "api.default_limit", var_type: VarType::U64, mutable: true },
    VarSpec { name: "api.max_query_length", var_type: VarType::U64, mutable: true },
    VarSpec { name: "api.rate_limiting.enable", var_type: VarType::Bool, mutable: true },
    VarSpec { name: "api.rate_limiting.capacity", var_type: VarType::U64, mutable: true },
    VarSpec { name: "api.rate_limiting.refill_rate", var_type: VarType::U64, mutable: true },
    VarSpec { name: "cache.enabled", var_type: VarType::Bool, mutable: true },
    VarSpec { name: "cache.min_query_cost_ms", var_type: VarType::U64, mutable: true },
    VarSpec { name: "cache.ttl_seconds", var_type: VarType::U64, mutable: true },
    // Everything else named in config is immutable without a restart.
    VarSpec { name: "api.tcp_port", var_type: VarType::U64, mutable: false },
    VarSpec { name: "api.worker_threads", var_type: VarType::U64, mutable: false },
    VarSpec { name: "mysql.replica_id", var_type: VarType::U64, mutable: false },
    VarSpec { name: "dump.dir", var_type: VarType::String, mutable: false },
    VarSpec { name: "dump.interval_sec", var_type: VarType::U64, mutable: false },
];

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        other => Err(format!("'{other}' is not a valid boolean")),
    }
}

/// A MySQL-style `SET varname=value` / `SHOW VARIABLES` surface over the
/// static catalog above (spec §4.12). Holds only the last-applied string
/// value per variable; the actual side effect happens via `apply_variable`
/// against a `VariableTargets`, never inside the registry itself.
pub struct RuntimeVariableRegistry {
    values: RwLock<HashMap<String, String>>,
}

impl RuntimeVariableRegistry {
    pub fn new(initial: HashMap<String, String>) -> Self {
        RuntimeVariableRegistry { values: RwLock::new(initial) }
    }

    fn spec(name: &str) -> Option<&'static VarSpec> {
        CATALOG.iter().find(|v| v.name.eq_ignore_ascii_case(name))
    }

    /// Validates, applies the side effect, and (only on success) records the
    /// new value — so a failed apply never leaves `SHOW VARIABLES` lying
    /// about the live state (spec §4.12).
    pub fn set(&self, name: &str, value: &str, targets: &VariableTargets) -> MygramResult<()> {
        let spec = Self::spec(name).ok_or_else(|| MygramError::invalid_argument(format!("unknown variable '{name}'")))?;
        if !spec.mutable {
            return Err(MygramError::failed_precondition(format!("'{name}' is immutable (requires restart)")));
        }
        match spec.var_type {
            VarType::Bool => parse_bool(value).map_err(MygramError::invalid_argument)?,
            VarType::U64 => {
                value.parse::<u64>().map_err(|e| MygramError::invalid_argument(format!("'{value}' is not a valid integer: {e}")))?;
                true
            }
            VarType::String => true,
        };

        apply_variable(spec.name, value, targets)?;
        self.values.write().expect("variables lock poisoned").insert(spec.name.to_string(), value.to_string());
        Ok(())
    }

    /// Rows for `SHOW VARIABLES [LIKE pattern]` (spec §4.12), in catalog
    /// order. `pattern` uses SQL LIKE syntax (`%` any run, `_` one char,
    /// case-insensitive).
    pub fn show(&self, pattern: Option<&str>) -> Vec<(String, String, bool)> {
        let values = self.values.read().expect("variables lock poisoned");
        CATALOG
            .iter()
            .filter(|spec| pattern.map(|p| like_match(p, spec.name)).unwrap_or(true))
            .map(|spec| {
                let value = values.get(spec.name).cloned().unwrap_or_default();
                (spec.name.to_string(), value, spec.mutable)
            })
            .collect()
    }
}

/// Minimal SQL LIKE matcher: `%` matches any run (including empty), `_`
/// matches exactly one character, everything else is literal and
/// case-insensitive (spec §4.12, SHOW VARIABLES LIKE).
fn like_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let candidate: Vec<char> = candidate.to_ascii_lowercase().chars().collect();
    like_match_rec(&pattern, &candidate)
}

fn like_match_rec(pattern: &[char], candidate: &[char]) -> bool {
    match pattern.first() {
        None => candidate.is_empty(),
        Some('%') => {
            (0..=candidate.len()).any(|i| like_match_rec(&pattern[1..], &candidate[i..]))
        }
        Some('_') => !candidate.is_empty() && like_match_rec(&pattern[1..], &candidate[1..]),
        Some(c) => candidate.first() == Some(c) && like_match_rec(&pattern[1..], &candidate[1..]),
    }
}

/// The actual side effect of one `SET`, dispatched by variable name rather
/// than by stored closure (spec §9, "avoid cyclic ownership between the
/// registry and the state it mutates").
pub fn apply_variable(name: &str, value: &str, targets: &VariableTargets) -> MygramResult<()> {
    match name {
        "logging.level" => common::log::set_level(value).map_err(MygramError::invalid_argument),
        "logging.format" => Ok(()), // format changes require a fresh subscriber; recorded for SHOW VARIABLES only.
        "mysql.host" => {
            *targets.mysql_endpoint.host.write().expect("mysql endpoint lock poisoned") = value.to_string();
            Ok(())
        }
        "mysql.port" => {
            let port: u16 = value.parse().map_err(|e| MygramError::invalid_argument(format!("invalid port: {e}")))?;
            targets.mysql_endpoint.port.store(port, Ordering::SeqCst);
            Ok(())
        }
        "api.default_limit" => {
            let n: u64 = value.parse().map_err(|e| MygramError::invalid_argument(format!("{e}")))?;
            targets.default_limit.store(n, Ordering::SeqCst);
            Ok(())
        }
        "api.max_query_length" => {
            let n: usize = value.parse().map_err(|e| MygramError::invalid_argument(format!("{e}")))?;
            targets.max_query_length.store(n, Ordering::SeqCst);
            Ok(())
        }
        "api.rate_limiting.enable" => {
            let enabled = parse_bool(value).map_err(MygramError::invalid_argument)?;
            targets.rate_limit_enabled.store(enabled, Ordering::SeqCst);
            reconfigure_rate_limiter(targets);
            Ok(())
        }
        "api.rate_limiting.capacity" => {
            let n: u64 = value.parse().map_err(|e| MygramError::invalid_argument(format!("{e}")))?;
            targets.rate_limit_capacity.store(n, Ordering::SeqCst);
            reconfigure_rate_limiter(targets);
            Ok(())
        }
        "api.rate_limiting.refill_rate" => {
            let n: u64 = value.parse().map_err(|e| MygramError::invalid_argument(format!("{e}")))?;
            targets.rate_limit_refill.store(n, Ordering::SeqCst);
            reconfigure_rate_limiter(targets);
            Ok(())
        }
        "cache.enabled" => {
            if parse_bool(value).map_err(MygramError::invalid_argument)? {
                targets.cache.enable();
            } else {
                targets.cache.disable();
            }
            Ok(())
        }
        "cache.min_query_cost_ms" | "cache.ttl_seconds" => Ok(()), // read by the executor/cache at construction; recorded for SHOW VARIABLES.
        other => Err(MygramError::invalid_argument(format!("unknown variable '{other}'"))),
    }
}

fn reconfigure_rate_limiter(targets: &VariableTargets) {
    if !targets.rate_limit_enabled.load(Ordering::SeqCst) {
        targets.rate_limiter.disable();
        return;
    }
    let capacity = targets.rate_limit_capacity.load(Ordering::SeqCst) as u32;
    let refill = targets.rate_limit_refill.load(Ordering::SeqCst) as u32;
    targets.rate_limiter.reconfigure(capacity, refill);
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn targets() -> VariableTargets {
        VariableTargets {
            cache: Arc::new(ResultCache::new(1024 * 1024, 60)),
            rate_limiter: Arc::new(RateLimiterHandle::disabled()),
            default_limit: Arc::new(AtomicU64::new(20)),
            max_query_length: Arc::new(AtomicUsize::new(8192)),
            mysql_endpoint: Arc::new(MysqlEndpoint::new("127.0.0.1".to_string(), 3306)),
            rate_limit_enabled: Arc::new(AtomicBool::new(false)),
            rate_limit_capacity: Arc::new(AtomicU64::new(1000)),
            rate_limit_refill: Arc::new(AtomicU64::new(200)),
        }
    }

    #[test]
    fn immutable_variable_is_rejected() {
        let registry = RuntimeVariableRegistry::new(HashMap::new());
        let err = registry.set("api.tcp_port", "9999", &targets()).unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let registry = RuntimeVariableRegistry::new(HashMap::new());
        assert!(registry.set("not.a.variable", "1", &targets()).is_err());
    }

    #[test]
    fn mutable_variable_round_trips_through_show() {
        let registry = RuntimeVariableRegistry::new(HashMap::new());
        registry.set("api.default_limit", "50", &targets()).unwrap();
        let rows = registry.show(None);
        let row = rows.iter().find(|(n, _, _)| n == "api.default_limit").unwrap();
        assert_eq!(row.1, "50");
        assert!(row.2);
    }

    #[test]
    fn show_filters_by_like_pattern() {
        let registry = RuntimeVariableRegistry::new(HashMap::new());
        let rows = registry.show(Some("cache.%"));
        assert!(rows.iter().all(|(n, _, _)| n.starts_with("cache.")));
        assert!(!rows.is_empty());
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let registry = RuntimeVariableRegistry::new(HashMap::new());
        assert!(registry.set("cache.enabled", "maybe", &targets()).is_err());
    }

    #[test]
    fn like_pattern_matching() {
        assert!(like_match("cache.%", "cache.enabled"));
        assert!(like_match("api._efault_limit", "api.default_limit"));
        assert!(!like_match("cache.%", "mysql.host"));
    }
}
