use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::context::{ConnectionCtx, HandlerCtx};
use crate::dispatcher;

/// One accepted line, paired with the channel its answer goes back on.
struct Job {
    ctx: Arc<HandlerCtx>,
    conn: Arc<ConnectionCtx>,
    line: String,
    reply: oneshot::Sender<String>,
}

/// A bounded pool of command workers (spec §4.11, `api.worker_threads` /
/// `api.submission_queue_size`). Connections never run a handler directly;
/// they submit a `Job` and await its reply, so a slow SEARCH on one
/// connection can't starve the acceptor's accept loop.
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
}

impl WorkerPool {
    pub fn start(worker_threads: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for _ in 0..worker_threads.max(1) {
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    match job {
                        Some(job) => {
                            let body = dispatcher::dispatch_line(&job.ctx, &job.conn, &job.line).await;
                            let _ = job.reply.send(body);
                        }
                        None => break,
                    }
                }
            });
        }
        WorkerPool { tx }
    }

    /// Submits a line for processing, returning its rendered response. `Err`
    /// means the queue was full and the caller should reply with the
    /// `server busy` line instead of running the command at all (spec §5).
    pub async fn submit(
        &self,
        ctx: Arc<HandlerCtx>,
        conn: Arc<ConnectionCtx>,
        line: String,
    ) -> Result<String, ()> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx.try_send(Job { ctx, conn, line, reply }).map_err(|_| ())?;
        reply_rx.await.map_err(|_| ())
    }
}
