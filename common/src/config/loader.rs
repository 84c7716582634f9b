use crate::config::schema::{ApiConfig, Config, RawConfig};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub enum ConfigLoadError {
    Io(std::io::Error),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLoadError::Io(e) => write!(f, "could not read config file: {e}"),
            ConfigLoadError::Parse(e) => write!(f, "could not parse config file: {e}"),
            ConfigLoadError::Invalid(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

impl From<std::io::Error> for ConfigLoadError {
    fn from(e: std::io::Error) -> Self {
        ConfigLoadError::Io(e)
    }
}

/// Loads, merges, and validates a configuration file. TOML is the primary
/// format; a `.yml`/`.yaml` extension falls back to the deprecated
/// `serde_yaml` loader path the teacher's `common::config` also carried.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigLoadError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    let raw: RawConfig = if matches!(path.extension().and_then(|e| e.to_str()), Some("yml") | Some("yaml")) {
        serde_yaml::from_str(&text).map_err(|e| ConfigLoadError::Parse(e.to_string()))?
    } else {
        toml::from_str(&text).map_err(|e| ConfigLoadError::Parse(e.to_string()))?
    };

    let config = merge_legacy(raw);
    validate(&config).map_err(ConfigLoadError::Invalid)?;
    Ok(config)
}

/// Resolves the `server:` / `api:` ambiguity (spec §9, Open Question): the
/// two sections are merged field-by-field, with `api` winning any field it
/// sets explicitly regardless of which section appeared first in the file.
/// Since `ApiConfig` deserializes with defaults for every field, "set" here
/// is approximated as "present at all" — if only `server:` is present, its
/// values are used in full; if both are present, `api:`'s values are used in
/// full. This matches the documented precedence ("new `api:` should take
/// precedence over the legacy fields") while staying simple to reason about.
fn merge_legacy(raw: RawConfig) -> Config {
    let api = match (raw.server, raw.api) {
        (_, Some(api)) => api,
        (Some(server), None) => server,
        (None, None) => ApiConfig::default(),
    };

    Config {
        app_name: raw.app_name,
        mysql: raw.mysql,
        tables: raw.tables,
        api,
        cache: raw.cache,
        dump: raw.dump,
        network: raw.network,
        logging: raw.logging,
    }
}

/// Structural validation beyond what serde's defaults can express: replica
/// id must be non-zero (spec §4.9), table names must be unique, every
/// required filter's literal must parse under its declared type.
pub fn validate(config: &Config) -> Result<(), String> {
    if config.mysql.replica_id == 0 {
        return Err("mysql.replica_id must be non-zero".to_string());
    }
    if config.mysql.reconnect_backoff_min_ms > config.mysql.reconnect_backoff_max_ms {
        return Err("mysql.reconnect_backoff_min_ms must be <= reconnect_backoff_max_ms".to_string());
    }

    let mut names = std::collections::HashSet::new();
    for table in &config.tables {
        if !names.insert(table.name.clone()) {
            return Err(format!("duplicate table name '{}'", table.name));
        }
        if table.text_source.columns.is_empty() {
            return Err(format!("table '{}' has an empty text_source", table.name));
        }
        if table.w_ascii == 0 {
            return Err(format!("table '{}' has w_ascii = 0", table.name));
        }
        for f in &table.required_filters {
            use crate::types::FilterValue;
            if !matches!(f.op, crate::config::FilterOp::IsNull | crate::config::FilterOp::IsNotNull)
                && FilterValue::parse(&f.value, f.column_type).is_err()
            {
                return Err(format!(
                    "table '{}' required filter on '{}' has a literal that does not parse as {:?}",
                    table.name, f.column, f.column_type
                ));
            }
        }
    }

    if config.api.default_limit == 0 {
        return Err("api.default_limit must be > 0".to_string());
    }
    if !(5..=1000).contains(&config.api.default_limit) {
        return Err("api.default_limit must be between 5 and 1000".to_string());
    }

    for cidr in &config.network.allow_cidrs {
        cidr.parse::<ipnet::IpNet>()
            .map_err(|e| format!("invalid CIDR '{cidr}': {e}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{MysqlConfig, TableConfig, TextSource};
    use std::io::Write;

    fn base_table(name: &str) -> TableConfig {
        TableConfig {
            name: name.to_string(),
            pk_column: "id".to_string(),
            text_source: TextSource {
                columns: vec!["title".to_string()],
                delimiter: " ".to_string(),
            },
            required_filters: vec![],
            optional_filters: vec![],
            w_ascii: 2,
            w_cjk: 0,
            posting: Default::default(),
        }
    }

    fn base_config() -> Config {
        Config {
            app_name: "test".to_string(),
            mysql: MysqlConfig {
                host: "127.0.0.1".to_string(),
                port: 3306,
                username: "root".to_string(),
                password: "".to_string(),
                database: None,
                replica_id: 42,
                reconnect_backoff_min_ms: 500,
                reconnect_backoff_max_ms: 30_000,
                state_write_interval_events: 1000,
                event_queue_size: 10_000,
                use_gtid: true,
            },
            tables: vec![base_table("posts")],
            api: ApiConfig::default(),
            cache: Default::default(),
            dump: Default::default(),
            network: Default::default(),
            logging: Default::default(),
        }
    }

    #[test]
    fn rejects_zero_replica_id() {
        let mut c = base_config();
        c.mysql.replica_id = 0;
        assert!(validate(&c).is_err());
    }

    #[test]
    fn rejects_duplicate_table_names() {
        let mut c = base_config();
        c.tables.push(base_table("posts"));
        assert!(validate(&c).is_err());
    }

    #[test]
    fn accepts_valid_config() {
        let c = base_config();
        assert!(validate(&c).is_ok());
    }

    #[test]
    fn api_section_wins_over_legacy_server_section() {
        let toml_text = r#"
[mysql]
host = "127.0.0.1"
username = "root"
password = ""
replica_id = 7

[server]
tcp_port = 9000

[api]
tcp_port = 9100
"#;
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        f.write_all(toml_text.as_bytes()).unwrap();
        let config = load_from_file(f.path()).unwrap();
        assert_eq!(config.api.tcp_port, 9100);
    }
}
