mod daemon;
mod signal;

use clap::Parser;
use common::config::{Config, TableConfig};
use common::log::{LogFormat, LogOptions};
use docstore::table_context::TableContext;
use server::admission::AdmissionGates;
use server::context::HandlerCtx;
use server::replication_control::ReplicationControl;
use server::{ConnectionAcceptor, WorkerPool};
use signal::SignalManager;
use snapshot::SnapshotScheduler;
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info, warn};

/// In-memory ngram full-text search engine mirrored from a MySQL-compatible
/// binlog source. Run with `-t` against a candidate config to validate it
/// without starting the server.
#[derive(Parser, Debug)]
#[command(name = "mygramdb", version, about)]
struct Cli {
    /// Path to the TOML (or legacy YAML) configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to a supplementary table-schema file, merged into `tables`
    /// after the main config is loaded.
    #[arg(short = 's', long = "schema")]
    schema: Option<PathBuf>,

    /// Daemonize: fork, detach from the controlling terminal, redirect
    /// stdio to /dev/null.
    #[arg(short = 'd', long = "daemon")]
    daemon: bool,

    /// Validate the configuration and exit without starting the server.
    #[arg(short = 't', long = "config-test")]
    config_test: bool,

    /// Positional config path, accepted for parity with tools that invoke
    /// `mygramdb config.toml` directly.
    positional_config: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize)]
struct SchemaFile {
    #[serde(default)]
    tables: Vec<TableConfig>,
}

fn load_schema_file(path: &Path) -> Result<Vec<TableConfig>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("could not read schema file: {e}"))?;
    let parsed: SchemaFile = if matches!(path.extension().and_then(|e| e.to_str()), Some("yml") | Some("yaml")) {
        serde_yaml::from_str(&text).map_err(|e| format!("could not parse schema file: {e}"))?
    } else {
        toml::from_str(&text).map_err(|e| format!("could not parse schema file: {e}"))?
    };
    Ok(parsed.tables)
}

fn resolve_config_path(cli: &Cli) -> Result<PathBuf, String> {
    cli.config
        .clone()
        .or_else(|| cli.positional_config.clone())
        .ok_or_else(|| "no config file given (use -c/--config or a positional path)".to_string())
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let config_path = resolve_config_path(cli)?;
    let mut config = common::config::load_from_file(&config_path).map_err(|e| e.to_string())?;

    if let Some(schema_path) = &cli.schema {
        let extra = load_schema_file(schema_path)?;
        config.tables.extend(extra);
        common::config::validate(&config)?;
    }

    Ok(config)
}

/// Refuses to run as uid 0: a compromised query handler should never
/// inherit root privileges just because the operator forgot `--user`.
#[cfg(unix)]
fn refuse_root() -> Result<(), String> {
    if unsafe { libc::getuid() } == 0 {
        return Err("refusing to run as root; start mygramdb as an unprivileged user".to_string());
    }
    Ok(())
}

#[cfg(not(unix))]
fn refuse_root() -> Result<(), String> {
    Ok(())
}

fn build_tables(config: &Config) -> HashMap<String, Arc<TableContext>> {
    config
        .tables
        .iter()
        .map(|t| (t.name.clone(), Arc::new(TableContext::new(t.clone()))))
        .collect()
}

/// Finds the most recently written snapshot directory under `dump.dir`
/// (identified by containing `meta.json`) and loads it into `tables`, if
/// any exists. A fresh deployment with no prior snapshot starts every
/// table empty and waits for `REPLICATION START`/`SYNC` to populate it.
fn load_latest_snapshot(dump_dir: &Path, tables: &HashMap<String, Arc<TableContext>>) {
    let Ok(entries) = fs::read_dir(dump_dir) else {
        info!(event = "snapshot_dir_absent", dir = %dump_dir.display());
        return;
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join("meta.json").is_file())
        .collect();
    candidates.sort();

    let Some(latest) = candidates.pop() else {
        info!(event = "no_snapshot_found", dir = %dump_dir.display());
        return;
    };

    match snapshot::load_snapshot(&latest, tables) {
        Ok(loaded) => info!(event = "startup_snapshot_loaded", dir = %latest.display(), tables = loaded.len()),
        Err(e) => warn!(event = "startup_snapshot_load_failed", dir = %latest.display(), error = %e),
    }
}

fn bind_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}").parse().map_err(|e| format!("invalid bind address {host}:{port}: {e}"))
}

async fn run(config: Config) -> ExitCode {
    let tables = build_tables(&config);
    load_latest_snapshot(Path::new(&config.dump.dir), &tables);

    let dump_save_in_progress = Arc::new(AtomicBool::new(false));
    let cache = Arc::new(query::ResultCache::new(config.cache.max_memory_bytes, config.cache.ttl_seconds));
    if !config.cache.enabled {
        cache.disable();
    }
    let admission = Arc::new(AdmissionGates::new(dump_save_in_progress.clone(), config.api.read_only));

    let reader_config = replication::BinlogReaderConfig {
        replica_id: config.mysql.replica_id,
        reconnect_backoff_min_ms: config.mysql.reconnect_backoff_min_ms,
        reconnect_backoff_max_ms: config.mysql.reconnect_backoff_max_ms,
        state_write_interval_events: config.mysql.state_write_interval_events,
        state_file_path: None,
    };
    let replication = Arc::new(ReplicationControl::new(
        config.mysql.clone(),
        reader_config,
        config.mysql.event_queue_size,
        tables.clone(),
        cache,
        admission.clone(),
    ));
    if let Err(e) = replication.start() {
        warn!(event = "replication_autostart_failed", error = %e);
    }

    let worker_pool = WorkerPool::start(config.api.worker_threads, config.api.submission_queue_size);
    let ctx = Arc::new(HandlerCtx::new(&config, tables.clone(), replication.clone(), admission, worker_pool));

    let scheduler = Arc::new(SnapshotScheduler::new(dump_save_in_progress));
    let scheduler_tables = Arc::new(tables);
    let scheduler_handle = {
        let scheduler = scheduler.clone();
        let dump_config = config.dump.clone();
        tokio::spawn(async move { scheduler.run(dump_config, scheduler_tables).await })
    };

    let tcp_addr = match bind_addr(&config.api.tcp_host, config.api.tcp_port) {
        Ok(addr) => addr,
        Err(e) => {
            error!(event = "invalid_tcp_bind_addr", error = %e);
            return ExitCode::FAILURE;
        }
    };
    let acceptor = Arc::new(ConnectionAcceptor::new(&config.network.allow_cidrs));
    let acceptor_ctx = ctx.clone();
    let acceptor_handle = tokio::spawn(async move { acceptor.run(tcp_addr, acceptor_ctx).await });

    let http_handle = if let Some(http_port) = config.api.http_port {
        match bind_addr(&config.api.tcp_host, http_port) {
            Ok(http_addr) => {
                let http_ctx = ctx.clone();
                Some(tokio::spawn(async move { server::http::serve(http_ctx, http_addr).await }))
            }
            Err(e) => {
                error!(event = "invalid_http_bind_addr", error = %e);
                None
            }
        }
    } else {
        None
    };

    info!(event = "server_started", app_name = %config.app_name, tcp_addr = %tcp_addr);

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;

        if SignalManager::consume_log_reopen_request() {
            info!(event = "log_reopen_requested");
        }

        if SignalManager::is_shutdown_requested() {
            info!(event = "shutdown_requested");
            break;
        }

        if acceptor_handle.is_finished() {
            error!(event = "acceptor_task_exited");
            break;
        }
    }

    replication.stop();
    scheduler.stop();
    acceptor_handle.abort();
    if let Some(h) = &http_handle {
        h.abort();
    }
    let _ = scheduler_handle.await;

    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = refuse_root() {
        eprintln!("mygramdb: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("mygramdb: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.config_test {
        println!("configuration OK");
        return ExitCode::SUCCESS;
    }

    if cli.daemon {
        if let Err(e) = daemon::daemonize() {
            eprintln!("mygramdb: failed to daemonize: {e}");
            return ExitCode::FAILURE;
        }
    }

    let log_dir = config.logging.dir.clone();
    let level = common::log::parse_level(&config.logging.level).unwrap_or(tracing::Level::INFO);
    let format = LogFormat::parse(&config.logging.format).unwrap_or(LogFormat::Text);
    common::log::init(LogOptions { level, format, log_dir });

    let _signals = SignalManager::install();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("mygramdb: failed to start tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(config))
}
