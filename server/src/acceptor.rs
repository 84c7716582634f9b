use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use ipnet::IpNet;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection;
use crate::context::HandlerCtx;

/// Single-threaded accept loop owning the listening socket (spec §2
/// component 17, §5 "Acceptor task"). Every accepted connection is checked
/// against the CIDR allowlist before a single line is ever read from it;
/// connections outside the allowlist are closed immediately and logged once.
pub struct ConnectionAcceptor {
    allow_cidrs: Vec<IpNet>,
}

impl ConnectionAcceptor {
    pub fn new(allow_cidrs: &[String]) -> Self {
        let allow_cidrs = allow_cidrs
            .iter()
            .filter_map(|c| c.parse::<IpNet>().ok())
            .collect();
        ConnectionAcceptor { allow_cidrs }
    }

    fn is_allowed(&self, addr: IpAddr) -> bool {
        self.allow_cidrs.is_empty() || self.allow_cidrs.iter().any(|net| net.contains(&addr))
    }

    /// Binds `bind_addr` and serves connections forever, handing each
    /// accepted socket to `ctx.worker_pool`'s backing connection task (spec
    /// §4.11, "hands sockets to a worker pool"). Never returns under normal
    /// operation; the caller races it against a shutdown signal.
    pub async fn run(&self, bind_addr: SocketAddr, ctx: Arc<HandlerCtx>) -> std::io::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!(event = "tcp_listen", addr = %bind_addr);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(event = "accept_failed", error = %e);
                    continue;
                }
            };

            if !self.is_allowed(peer.ip()) {
                ctx.stats.record_rejected_ip();
                warn!(event = "connection_rejected_ip", peer = %peer);
                continue;
            }

            let ctx = ctx.clone();
            tokio::spawn(async move {
                connection::serve(stream, ctx).await;
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_allowlist_allows_everything() {
        let acceptor = ConnectionAcceptor::new(&[]);
        assert!(acceptor.is_allowed("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn allowlist_restricts_to_configured_cidrs() {
        let acceptor = ConnectionAcceptor::new(&["127.0.0.1/32".to_string(), "10.0.0.0/8".to_string()]);
        assert!(acceptor.is_allowed("127.0.0.1".parse().unwrap()));
        assert!(acceptor.is_allowed("10.1.2.3".parse().unwrap()));
        assert!(!acceptor.is_allowed("203.0.113.7".parse().unwrap()));
    }
}
