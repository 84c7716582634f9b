use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::context::{ConnectionCtx, HandlerCtx};
use crate::worker_pool::WorkerPool;

/// Serves one TCP connection: read a `\n`-terminated line, hand it to the
/// worker pool, write the response back with a trailing `\r\n` (spec §6,
/// "one command per line"). The connection stays open across commands until
/// the peer closes it or a write fails.
pub async fn serve(stream: TcpStream, ctx: Arc<HandlerCtx>) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(event = "connection_peer_addr_failed", error = %e);
            return;
        }
    };
    let conn = Arc::new(ConnectionCtx::new(peer_addr));
    ctx.stats.record_connection_accepted();
    info!(event = "connection_accepted", peer = %peer_addr);

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let max_len = ctx.max_query_length();

    loop {
        let mut raw = String::new();
        match reader.read_line(&mut raw).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(event = "connection_read_failed", peer = %peer_addr, error = %e);
                break;
            }
        }
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        if line.len() > max_len {
            let body = format!("ERROR query exceeds max_query_length ({max_len})\r\n");
            if write_half.write_all(body.as_bytes()).await.is_err() {
                break;
            }
            continue;
        }

        let body = match ctx.worker_pool.submit(ctx.clone(), conn.clone(), line.to_string()).await {
            Ok(body) => body,
            Err(()) => {
                ctx.stats.record_rejected_queue_full();
                "ERROR server busy".to_string()
            }
        };

        if write_half.write_all(body.as_bytes()).await.is_err() {
            break;
        }
        if write_half.write_all(b"\r\n").await.is_err() {
            break;
        }
    }

    ctx.stats.record_connection_closed();
    info!(event = "connection_closed", peer = %peer_addr);
}
