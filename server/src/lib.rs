pub mod acceptor;
pub mod admission;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod handlers;
pub mod http;
pub mod meminfo;
pub mod rate_limit;
pub mod replication_control;
pub mod response;
pub mod stats;
pub mod stub_source;
pub mod variables;
pub mod worker_pool;

pub use acceptor::ConnectionAcceptor;
pub use context::{ConnectionCtx, HandlerCtx};
pub use worker_pool::WorkerPool;
