use crate::context::{ConnectionCtx, HandlerCtx};
use crate::meminfo;
use crate::response::{self, error_line};
use crate::stub_source::UnavailableSource;
use common::error::{MygramError, MygramResult};
use common::time_util::now_str;
use query::{Command, DumpTarget, ParserConfig, QueryExecutor};
use replication::{JobStatus, RestartOutcome};
use snapshot::{load_snapshot, prune_auto_snapshots, save_snapshot, SnapshotCodec};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

/// Parses and routes one command line to the matching handler, returning the
/// full response body (no trailing `\r\n`, added by the connection writer)
/// (spec §4.11, Handler registry).
pub async fn handle_line(ctx: &HandlerCtx, conn: &ConnectionCtx, line: &str) -> String {
    let parser_cfg = ParserConfig { default_limit: ctx.default_limit() };
    match query::parse_command(line, &parser_cfg) {
        Ok(cmd) => match dispatch(ctx, conn, cmd).await {
            Ok(body) => body,
            Err(e) => error_line(e),
        },
        Err(e) => error_line(e),
    }
}

async fn dispatch(ctx: &HandlerCtx, conn: &ConnectionCtx, cmd: Command) -> MygramResult<String> {
    match cmd {
        Command::Search { table, expr, clauses } => search(ctx, conn, &table, &expr, &clauses),
        Command::Count { table, expr, filter } => count(ctx, &table, &expr, filter.as_ref()),
        Command::Get { table, pk } => get(ctx, &table, &pk),
        Command::Info => Ok(info(ctx)),
        Command::Debug(on) => {
            conn.set_debug(on);
            Ok(if on { response::DEBUG_ON.to_string() } else { response::DEBUG_OFF.to_string() })
        }
        Command::Optimize => optimize(ctx),
        Command::Dump { target, path } => dump(ctx, target, path),
        Command::ReplicationStatus => Ok(replication_status(ctx)),
        Command::ReplicationStart => replication_start(ctx),
        Command::ReplicationStop => {
            ctx.replication.stop();
            Ok("OK REPLICATION STOPPED".to_string())
        }
        Command::Sync { table } => sync_start(ctx, &table).await,
        Command::SyncStatus => Ok(sync_status(ctx)),
        Command::CacheStats => Ok(cache_stats(ctx)),
        Command::CacheClear => {
            ctx.cache.clear();
            Ok("OK CACHE CLEARED".to_string())
        }
        Command::CacheEnable => {
            ctx.cache.enable();
            Ok("OK CACHE ENABLED".to_string())
        }
        Command::CacheDisable => {
            ctx.cache.disable();
            Ok("OK CACHE DISABLED".to_string())
        }
        Command::Set(assignments) => set_variables(ctx, assignments),
        Command::ShowVariables(pattern) => Ok(show_variables(ctx, pattern)),
    }
}

fn resolve_table<'a>(ctx: &'a HandlerCtx, name: &str) -> MygramResult<&'a docstore::table_context::TableContext> {
    ctx.table(name).map(|t| t.as_ref()).ok_or_else(|| MygramError::not_found(format!("no such table '{name}'")))
}

fn search(
    ctx: &HandlerCtx,
    conn: &ConnectionCtx,
    table_name: &str,
    expr: &ngram::ast::BooleanExpr,
    clauses: &query::SearchClauses,
) -> MygramResult<String> {
    ctx.admission.check_query()?;
    let table = resolve_table(ctx, table_name)?;
    let executor = QueryExecutor::new(&ctx.cache, ctx.min_query_cost_ms());
    let query_text = expr.leaves().iter().map(|t| t.text().to_string()).collect::<Vec<_>>().join(" ");
    let debug_enabled = conn.debug_enabled();
    let outcome = executor.search(table, &query_text, expr, clauses, debug_enabled);
    let base = response::search_line(&outcome.rows, outcome.total_matched);
    Ok(match outcome.debug {
        Some(debug) => response::append_debug_block(&base, &debug),
        None => base,
    })
}

fn count(
    ctx: &HandlerCtx,
    table_name: &str,
    expr: &ngram::ast::BooleanExpr,
    filter: Option<&docstore::filter_evaluator::OptionalFilterExpr>,
) -> MygramResult<String> {
    ctx.admission.check_query()?;
    let table = resolve_table(ctx, table_name)?;
    let executor = QueryExecutor::new(&ctx.cache, ctx.min_query_cost_ms());
    let query_text = expr.leaves().iter().map(|t| t.text().to_string()).collect::<Vec<_>>().join(" ");
    let n = executor.count(table, &query_text, expr, filter);
    Ok(response::count_line(n))
}

fn get(ctx: &HandlerCtx, table_name: &str, pk: &str) -> MygramResult<String> {
    ctx.admission.check_query()?;
    let table = resolve_table(ctx, table_name)?;
    let executor = QueryExecutor::new(&ctx.cache, ctx.min_query_cost_ms());
    let columns: Vec<String> = table.schema.columns.iter().map(|c| c.name.clone()).collect();
    match executor.get(table, pk) {
        Some(row) => Ok(response::doc_line(&row, &columns)),
        None => Err(MygramError::not_found(format!("no document with primary key '{pk}'"))),
    }
}

fn optimize(ctx: &HandlerCtx) -> MygramResult<String> {
    ctx.admission.check_write()?;
    let mut dropped_total = 0usize;
    let mut reencoded_total = 0usize;
    for table in ctx.tables.values() {
        let (dropped, reencoded) = table.optimize();
        dropped_total += dropped;
        reencoded_total += reencoded;
    }
    Ok(format!("OK OPTIMIZED ngrams_dropped={dropped_total} postings_reencoded={reencoded_total}"))
}

fn dump_name_or(path: Option<String>, fallback: impl FnOnce() -> String) -> String {
    path.unwrap_or_else(fallback)
}

fn auto_manual_name() -> String {
    format!("manual_{}", now_str().replace([':', ' ', '+'], "-"))
}

fn dump(ctx: &HandlerCtx, target: DumpTarget, path: Option<String>) -> MygramResult<String> {
    let root = PathBuf::from(&ctx.dump.dir);
    match target {
        DumpTarget::Save => {
            ctx.admission.check_dump_save()?;
            let name = dump_name_or(path, auto_manual_name);
            save_snapshot(&root, &name, &ctx.tables, &ctx.admission.dump_save_in_progress)?;
            prune_auto_snapshots(&root, ctx.dump.retain)?;
            Ok(response::SAVED.to_string())
        }
        DumpTarget::Load => {
            ctx.admission.check_write()?;
            let name = path.ok_or_else(|| MygramError::invalid_argument("DUMP LOAD requires a path"))?;
            ctx.admission.dump_load_in_progress.store(true, Ordering::SeqCst);
            let result = load_snapshot(&root.join(&name), &ctx.tables);
            ctx.admission.dump_load_in_progress.store(false, Ordering::SeqCst);
            result?;
            ctx.cache.clear();
            Ok(response::LOADED.to_string())
        }
        DumpTarget::Verify => {
            let name = path.ok_or_else(|| MygramError::invalid_argument("DUMP VERIFY requires a path"))?;
            let dir = root.join(&name);
            let manifest = SnapshotCodec::read_manifest(&dir)?;
            for table in &manifest.tables {
                SnapshotCodec::verify_table(&dir, table)?;
            }
            Ok(response::VERIFIED.to_string())
        }
        DumpTarget::Info => {
            let name = path.ok_or_else(|| MygramError::invalid_argument("DUMP INFO requires a path"))?;
            let dir = root.join(&name);
            let manifest = SnapshotCodec::read_manifest(&dir)?;
            let lines = vec![
                ("version".to_string(), manifest.version),
                ("tables".to_string(), manifest.tables.join(",")),
                ("gtid".to_string(), manifest.gtid),
                ("timestamp".to_string(), manifest.timestamp),
            ];
            Ok(response::multi_line("OK DUMP INFO", &[("Dump", lines)]))
        }
    }
}

fn replication_status(ctx: &HandlerCtx) -> String {
    let state = ctx.replication.state();
    let gtid = ctx.replication.gtid();
    let mut lines = vec![
        ("state".to_string(), format!("{:?}", state)),
        ("gtid".to_string(), gtid.as_str().to_string()),
        ("failure_count".to_string(), ctx.replication.failure_count().to_string()),
        ("last_error".to_string(), ctx.replication.last_error().unwrap_or_else(|| "none".to_string())),
    ];
    for (name, value) in ctx.replication.counters() {
        lines.push((name.to_string(), value.to_string()));
    }
    response::multi_line("OK REPLICATION STATUS", &[("Replication", lines)])
}

fn replication_start(ctx: &HandlerCtx) -> MygramResult<String> {
    ctx.admission.check_replication_start()?;
    ctx.replication.start()?;
    Ok("OK REPLICATION STARTED".to_string())
}

async fn sync_start(ctx: &HandlerCtx, table_name: &str) -> MygramResult<String> {
    let table = resolve_table(ctx, table_name)?;
    ctx.admission.check_sync(table_name, &ctx.sync_coordinator)?;
    table.mark_needs_sync();
    let job_id = ctx
        .sync_coordinator
        .start(ctx.tables[table_name].clone(), UnavailableSource::new())
        .await?;
    Ok(response::sync_started_line(table_name, job_id))
}

fn replication_restart_label(outcome: &RestartOutcome) -> String {
    match outcome {
        RestartOutcome::Restarted => "restarted".to_string(),
        RestartOutcome::Skipped => "skipped".to_string(),
        RestartOutcome::Failed(reason) => format!("failed: {reason}"),
    }
}

fn sync_status(ctx: &HandlerCtx) -> String {
    let jobs = ctx.sync_coordinator.status_lines();
    if jobs.is_empty() {
        return response::multi_line("OK SYNC STATUS", &[]);
    }
    let sections: Vec<(&str, Vec<(String, String)>)> = jobs
        .iter()
        .map(|job| {
            let lines = match &job.status {
                JobStatus::Running { processed_rows, total_rows_estimate, rows_per_second } => vec![
                    ("job_id".to_string(), job.job_id.to_string()),
                    ("status".to_string(), "running".to_string()),
                    ("processed_rows".to_string(), processed_rows.to_string()),
                    ("total_rows_estimate".to_string(), total_rows_estimate.to_string()),
                    ("rows_per_second".to_string(), format!("{rows_per_second:.1}")),
                ],
                JobStatus::Succeeded { gtid, processed_rows, restart } => vec![
                    ("job_id".to_string(), job.job_id.to_string()),
                    ("status".to_string(), "succeeded".to_string()),
                    ("processed_rows".to_string(), processed_rows.to_string()),
                    ("gtid".to_string(), gtid.as_str().to_string()),
                    ("replication_restart".to_string(), replication_restart_label(restart)),
                ],
                JobStatus::Failed { reason } => vec![
                    ("job_id".to_string(), job.job_id.to_string()),
                    ("status".to_string(), "failed".to_string()),
                    ("reason".to_string(), reason.clone()),
                ],
            };
            (job.table.as_str(), lines)
        })
        .collect();
    response::multi_line("OK SYNC STATUS", &sections)
}

fn cache_stats(ctx: &HandlerCtx) -> String {
    let stats = ctx.cache.stats();
    let lines = vec![
        ("enabled".to_string(), ctx.cache.is_enabled().to_string()),
        ("entries".to_string(), stats.entries.to_string()),
        ("bytes_used".to_string(), stats.bytes_used.to_string()),
        ("hits".to_string(), stats.hits.to_string()),
        ("misses".to_string(), stats.misses.to_string()),
    ];
    response::multi_line("OK CACHE STATS", &[("Cache", lines)])
}

fn set_variables(ctx: &HandlerCtx, assignments: Vec<(String, String)>) -> MygramResult<String> {
    for (name, value) in &assignments {
        ctx.variables.set(name, value, &ctx.variable_targets)?;
    }
    Ok("OK SET".to_string())
}

fn show_variables(ctx: &HandlerCtx, pattern: Option<String>) -> String {
    let rows = ctx.variables.show(pattern.as_deref());
    format!("OK SHOW VARIABLES\n{}", response::show_variables_table(&rows))
}

fn info(ctx: &HandlerCtx) -> String {
    let mem = meminfo::read();
    let health = ctx.memory_health();
    let (ip_rejected, queue_rejected, rate_rejected) = ctx.stats.rejection_counts();

    let server = vec![
        ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ("app_name".to_string(), ctx.app_name.clone()),
        ("uptime_seconds".to_string(), ctx.stats.uptime_seconds().to_string()),
    ];

    let stats_section = vec![
        ("total_commands_processed".to_string(), ctx.stats.total_commands_processed().to_string()),
        ("total_requests".to_string(), ctx.stats.total_requests().to_string()),
        ("rejected_ip_disallowed".to_string(), ip_rejected.to_string()),
        ("rejected_queue_full".to_string(), queue_rejected.to_string()),
        ("rejected_rate_limited".to_string(), rate_rejected.to_string()),
    ];

    let commandstats = ctx
        .stats
        .command_counts()
        .into_iter()
        .map(|(cmd, n)| (format!("cmdstat_{}", cmd.to_ascii_lowercase()), n.to_string()))
        .collect();

    let memory = vec![
        ("used_memory_bytes".to_string(), mem.process_rss_bytes.to_string()),
        ("used_memory_human".to_string(), human_bytes(mem.process_rss_bytes)),
        ("total_system_memory".to_string(), mem.total_system_bytes.to_string()),
        ("available_system_memory".to_string(), mem.available_system_bytes.to_string()),
        ("system_memory_usage_ratio".to_string(), format!("{:.4}", mem.usage_ratio())),
        ("process_rss".to_string(), mem.process_rss_bytes.to_string()),
        ("process_rss_peak".to_string(), mem.process_rss_peak_bytes.to_string()),
        ("memory_health".to_string(), health.as_str().to_string()),
    ];

    let (mut total_documents, mut total_terms, mut delta_encoded, mut bitmap) = (0u64, 0usize, 0usize, 0usize);
    for table in ctx.tables.values() {
        let read = table.read();
        total_documents += read.store().live_count() as u64;
        total_terms += read.index().ngram_count();
        delta_encoded += read.index().delta_encoded_count();
        bitmap += read.index().bitmap_count();
    }
    let index_section = vec![
        ("total_documents".to_string(), total_documents.to_string()),
        ("total_terms".to_string(), total_terms.to_string()),
        ("delta_encoded_lists".to_string(), delta_encoded.to_string()),
        ("roaring_bitmap_lists".to_string(), bitmap.to_string()),
    ];

    let clients = vec![("connected_clients".to_string(), ctx.stats.connected_clients().to_string())];

    let cache_stats = ctx.cache.stats();
    let cache_section = vec![
        ("cache_enabled".to_string(), ctx.cache.is_enabled().to_string()),
        ("cache_entries".to_string(), cache_stats.entries.to_string()),
        ("cache_bytes_used".to_string(), cache_stats.bytes_used.to_string()),
        ("cache_hits".to_string(), cache_stats.hits.to_string()),
        ("cache_misses".to_string(), cache_stats.misses.to_string()),
    ];

    let mut table_names: Vec<&String> = ctx.tables.keys().collect();
    table_names.sort();
    let tables_section = vec![
        ("tables".to_string(), table_names.into_iter().cloned().collect::<Vec<_>>().join(",")),
    ];

    let mut replication_lines: Vec<(String, String)> =
        vec![("replication_state".to_string(), format!("{:?}", ctx.replication.state()))];
    for (name, value) in ctx.replication.counters() {
        replication_lines.push((name.to_string(), value.to_string()));
    }

    response::multi_line(
        "OK INFO",
        &[
            ("Server", server),
            ("Stats", stats_section),
            ("Commandstats", commandstats),
            ("Memory", memory),
            ("Index", index_section),
            ("Clients", clients),
            ("Cache", cache_section),
            ("Tables", tables_section),
            ("Replication", replication_lines),
        ],
    )
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2}{}", UNITS[unit])
}
