use crate::context::{ConnectionCtx, HandlerCtx};
use crate::handlers;
use crate::response::error_line;

/// Wraps the handler registry with the two checks that apply to every line
/// before it is even parsed: the rate limiter and command accounting (spec
/// §4.11, §5). Parsing and routing itself happens in `handlers::handle_line`.
pub async fn dispatch_line(ctx: &HandlerCtx, conn: &ConnectionCtx, line: &str) -> String {
    if !ctx.rate_limiter.check() {
        ctx.stats.record_rejected_rate_limited();
        return error_line("rate limited");
    }

    let kind = command_kind(line);
    ctx.stats.record_command(kind);
    handlers::handle_line(ctx, conn, line).await
}

/// The first whitespace-separated token, upper-cased, used only for the
/// per-command counters in `INFO`'s `# Commandstats` — a malformed line
/// still gets a best-effort bucket rather than being dropped from the count.
fn command_kind(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("UNKNOWN")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_kind_extracts_leading_word() {
        assert_eq!(command_kind("SEARCH posts hello"), "SEARCH");
        assert_eq!(command_kind("  "), "UNKNOWN");
    }
}
