use query::{DebugInfo, DocumentRow};
use std::fmt::Write as _;

/// Renders a `FilterTuple` value the way GET/SEARCH debug output prints it:
/// bare for numbers/bools, unquoted for strings (the wire protocol has no
/// quoting convention of its own, matching every literal example in spec §8).
fn render_filter_value(v: &common::types::FilterValue) -> String {
    use common::types::FilterValue::*;
    match v {
        I64(n) => n.to_string(),
        U64(n) => n.to_string(),
        F64(n) => n.to_string(),
        Str(s) => s.clone(),
        DateTime(n) => n.to_string(),
        Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
        Null => "NULL".to_string(),
    }
}

fn render_row_filters(row: &DocumentRow, columns: &[String]) -> String {
    let mut out = String::new();
    for (i, col) in columns.iter().enumerate() {
        if let Some(v) = row.filters.get(i) {
            let _ = write!(out, " {col}={}", render_filter_value(v));
        }
    }
    out
}

/// `OK RESULTS <total> <pk1> <pk2> …` (spec §6).
pub fn search_line(rows: &[DocumentRow], total: u64) -> String {
    let mut out = format!("OK RESULTS {total}");
    for row in rows {
        let _ = write!(out, " {}", row.pk);
    }
    out
}

/// `OK COUNT <n>` (spec §6).
pub fn count_line(n: u64) -> String {
    format!("OK COUNT {n}")
}

/// `OK DOC <pk> col1=val1 col2=val2 …` (spec §6).
pub fn doc_line(row: &DocumentRow, columns: &[String]) -> String {
    format!("OK DOC {}{}", row.pk, render_row_filters(row, columns))
}

/// Appends the trailing `# DEBUG` block to a SEARCH/COUNT response when the
/// connection has DEBUG ON (spec §4.6, "Observable debug output").
pub fn append_debug_block(base: &str, debug: &DebugInfo) -> String {
    let mut out = format!("{base}\n# DEBUG\n");
    let _ = writeln!(out, "query_time: {}us", debug.elapsed_micros);
    let _ = writeln!(out, "index_time: {}us", debug.index_time_micros);
    let _ = writeln!(out, "terms: {}", debug.term_count);
    let _ = writeln!(out, "ngrams: {}", debug.ngram_counts.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(","));
    let _ = writeln!(out, "candidates: {}", debug.candidate_count);
    let _ = writeln!(out, "final: {}", debug.filtered_count);
    let _ = writeln!(out, "optimization: {}", debug.optimization);
    let _ = writeln!(
        out,
        "limit: {}",
        if debug.limit_defaulted { "(default)" } else { "set" }
    );
    let _ = writeln!(
        out,
        "offset: {}",
        if debug.offset_defaulted { "(default)" } else { "set" }
    );
    let _ = writeln!(
        out,
        "sort: {}",
        if debug.sort_defaulted { "(default)" } else { "set" }
    );
    let _ = writeln!(
        out,
        "filter: {}",
        if debug.filter_defaulted { "(default)" } else { "set" }
    );
    if debug.cache_hit {
        let _ = writeln!(out, "cache: hit");
        let _ = writeln!(out, "cache_age_ms: {}", debug.cache_age_ms.unwrap_or(0));
        let _ = writeln!(out, "cache_saved_ms: {}", debug.cache_saved_ms.unwrap_or(0));
    } else {
        let _ = writeln!(out, "cache: miss");
    }
    out.push_str("END");
    out
}

/// Renders a multi-line `OK <verb>` body, e.g. `INFO`/`SYNC STATUS`, as
/// `key: value` sections terminated by `END` (spec §6).
pub fn multi_line(header: &str, sections: &[(&str, Vec<(String, String)>)]) -> String {
    let mut out = format!("{header}\n");
    for (section, lines) in sections {
        let _ = writeln!(out, "# {section}");
        for (k, v) in lines {
            let _ = writeln!(out, "{k}: {v}");
        }
    }
    out.push_str("END");
    out
}

pub fn error_line<S: std::fmt::Display>(reason: S) -> String {
    format!("ERROR {reason}")
}

pub fn sync_started_line(table: &str, job_id: u64) -> String {
    format!("OK SYNC STARTED table={table} job_id={job_id}")
}

pub const DEBUG_ON: &str = "OK DEBUG_ON";
pub const DEBUG_OFF: &str = "OK DEBUG_OFF";
pub const SAVED: &str = "OK SAVED";
pub const LOADED: &str = "OK LOADED";
pub const VERIFIED: &str = "OK VERIFIED";

/// A MySQL `SHOW VARIABLES`-style ASCII box table (spec §4.12).
pub fn show_variables_table(rows: &[(String, String, bool)]) -> String {
    let header = ("Variable_name", "Value", "Mutable");
    let name_w = rows.iter().map(|r| r.0.len()).chain([header.0.len()]).max().unwrap_or(header.0.len());
    let value_w = rows.iter().map(|r| r.1.len()).chain([header.1.len()]).max().unwrap_or(header.1.len());
    let mutable_w = header.2.len();

    let sep = format!("+-{}-+-{}-+-{}-+", "-".repeat(name_w), "-".repeat(value_w), "-".repeat(mutable_w));
    let mut out = format!("{sep}\n");
    let _ = writeln!(out, "| {:<name_w$} | {:<value_w$} | {:<mutable_w$} |", header.0, header.1, header.2);
    out.push_str(&sep);
    out.push('\n');
    for (name, value, mutable) in rows {
        let mutable_str = if *mutable { "Yes" } else { "No" };
        let _ = writeln!(out, "| {:<name_w$} | {:<value_w$} | {:<mutable_w$} |", name, value, mutable_str);
    }
    out.push_str(&sep);
    out
}
