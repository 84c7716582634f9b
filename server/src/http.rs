use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use tracing::info;

use crate::context::{ConnectionCtx, HandlerCtx};
use crate::dispatcher;

/// Thin re-use of the TCP command surface over HTTP (spec §1, "The HTTP
/// surface is a thin translation layer that re-uses the TCP command
/// handlers; only the command contracts are specified here"). Every route
/// below builds the same line-oriented command text `dispatcher::dispatch_line`
/// already parses for TCP clients and renders it back as `text/plain`, so
/// there is exactly one place (query::parser + server::handlers) that knows
/// the grammar.
fn peer_addr(req: &HttpRequest) -> SocketAddr {
    req.peer_addr().unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)))
}

async fn run(ctx: &HandlerCtx, req: &HttpRequest, line: String) -> HttpResponse {
    let conn = ConnectionCtx::new(peer_addr(req));
    let body = dispatcher::dispatch_line(ctx, &conn, &line).await;
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(body)
}

/// `POST /command` — the raw escape hatch: body is one command line exactly
/// as a TCP client would send it, minus the `\r\n` terminator.
async fn post_command(ctx: web::Data<Arc<HandlerCtx>>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let line = String::from_utf8_lossy(&body).trim().to_string();
    run(&ctx, &req, line).await
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    table: String,
    q: String,
    filter: Option<String>,
    sort: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    debug: Option<bool>,
}

fn quote_if_needed(term: &str) -> String {
    if term.contains(' ') {
        format!("\"{term}\"")
    } else {
        term.to_string()
    }
}

fn build_search_line(verb: &str, q: &SearchQuery) -> String {
    let mut line = format!("{verb} {} {}", q.table, quote_if_needed(&q.q));
    if let Some(filter) = &q.filter {
        line.push_str(" FILTER ");
        line.push_str(filter);
    }
    if let Some(sort) = &q.sort {
        line.push_str(" SORT ");
        line.push_str(sort);
    }
    if let Some(limit) = q.limit {
        line.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = q.offset {
        line.push_str(&format!(" OFFSET {offset}"));
    }
    line
}

/// `GET /search?table=posts&q=hello+world&filter=status=1&limit=10` (spec
/// §4.5, §6). Translates straight into a `SEARCH` command line; `debug=true`
/// flips the per-connection DEBUG flag before dispatch (spec §4.6).
async fn get_search(ctx: web::Data<Arc<HandlerCtx>>, req: HttpRequest, query: web::Query<SearchQuery>) -> HttpResponse {
    let conn = ConnectionCtx::new(peer_addr(&req));
    conn.set_debug(query.debug.unwrap_or(false));
    let line = build_search_line("SEARCH", &query);
    let body = dispatcher::dispatch_line(&ctx, &conn, &line).await;
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(body)
}

/// `GET /count?table=posts&q=hello` — same translation as `/search`, minus
/// pagination (spec §4.5, §6).
async fn get_count(ctx: web::Data<Arc<HandlerCtx>>, req: HttpRequest, query: web::Query<SearchQuery>) -> HttpResponse {
    let line = build_search_line("COUNT", &query);
    run(&ctx, &req, line).await
}

#[derive(Debug, Deserialize)]
struct GetQuery {
    table: String,
}

/// `GET /doc/{pk}?table=posts` (spec §4.6, GET pipeline).
async fn get_doc(ctx: web::Data<Arc<HandlerCtx>>, req: HttpRequest, path: web::Path<String>, query: web::Query<GetQuery>) -> HttpResponse {
    let pk = path.into_inner();
    let line = format!("GET {} {}", query.table, pk);
    run(&ctx, &req, line).await
}

/// `GET /info` (spec §6, `OK INFO`).
async fn get_info(ctx: web::Data<Arc<HandlerCtx>>, req: HttpRequest) -> HttpResponse {
    run(&ctx, &req, "INFO".to_string()).await
}

/// `GET /healthz` — not part of the wire protocol; a plain liveness probe
/// for whatever orchestrates the process (container runtime, systemd).
async fn get_healthz() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body("OK")
}

/// Builds and runs the HTTP surface on `bind_addr` until the process exits.
/// Spawned alongside the TCP `ConnectionAcceptor`; both share the same
/// `HandlerCtx`, so `SET`, `SYNC`, and cache state are visible from either
/// surface immediately (spec §1, §2).
pub async fn serve(ctx: Arc<HandlerCtx>, bind_addr: SocketAddr) -> std::io::Result<()> {
    info!(event = "http_listen", addr = %bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(ctx.clone()))
            .route("/command", web::post().to(post_command))
            .route("/search", web::get().to(get_search))
            .route("/count", web::get().to(get_count))
            .route("/doc/{pk}", web::get().to(get_doc))
            .route("/info", web::get().to(get_info))
            .route("/healthz", web::get().to(get_healthz))
    })
    .bind(bind_addr)?
    .run()
    .await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_search_line_quotes_multi_word_terms() {
        let q = SearchQuery {
            table: "posts".to_string(),
            q: "hello world".to_string(),
            filter: Some("status=1".to_string()),
            sort: None,
            limit: Some(5),
            offset: None,
            debug: None,
        };
        assert_eq!(build_search_line("SEARCH", &q), "SEARCH posts \"hello world\" FILTER status=1 LIMIT 5");
    }

    #[test]
    fn build_search_line_leaves_bare_words_unquoted() {
        let q = SearchQuery {
            table: "posts".to_string(),
            q: "hello".to_string(),
            filter: None,
            sort: None,
            limit: None,
            offset: None,
            debug: None,
        };
        assert_eq!(build_search_line("COUNT", &q), "COUNT posts hello");
    }
}
