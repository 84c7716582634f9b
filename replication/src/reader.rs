use crate::source::{SourceConnection, SourceEvent};
use crate::state_file;
use common::config::MysqlConfig;
use common::gtid::Gtid;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// `BinlogReader`'s state machine (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReaderState {
    Idle = 0,
    Starting = 1,
    Streaming = 2,
    Reconnecting = 3,
    Stopped = 4,
}

impl ReaderState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReaderState::Idle,
            1 => ReaderState::Starting,
            2 => ReaderState::Streaming,
            3 => ReaderState::Reconnecting,
            _ => ReaderState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinlogReaderConfig {
    pub replica_id: u32,
    pub reconnect_backoff_min_ms: u64,
    pub reconnect_backoff_max_ms: u64,
    pub state_write_interval_events: u64,
    pub state_file_path: Option<PathBuf>,
}

/// A shared, cheaply-cloneable view of one reader task: state + current
/// GTID + a cooperative stop flag (spec §5, "Stop() unblocks the read").
#[derive(Clone)]
pub struct BinlogReaderHandle {
    state: Arc<AtomicU8>,
    gtid: Arc<Mutex<Gtid>>,
    stop: Arc<AtomicBool>,
}

impl BinlogReaderHandle {
    pub fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn gtid(&self) -> Gtid {
        self.gtid.lock().expect("reader gtid lock poisoned").clone()
    }

    /// Requests a graceful stop; the reader transitions to `Stopped` on its
    /// next state-machine tick (spec §4.9 transition table).
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, state: ReaderState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn set_gtid(&self, gtid: Gtid) {
        *self.gtid.lock().expect("reader gtid lock poisoned") = gtid;
    }
}

/// Spawns the reader's background task and returns a handle to observe and
/// stop it. `C` is the concrete `SourceConnection` implementation; tests use
/// a fake, production wiring uses a real MySQL/MariaDB client behind the
/// same trait (spec §4.9).
pub fn spawn<C: SourceConnection + 'static>(
    mysql_config: MysqlConfig,
    reader_config: BinlogReaderConfig,
    start_gtid: Gtid,
    event_tx: mpsc::Sender<SourceEvent>,
) -> (BinlogReaderHandle, JoinHandle<()>) {
    let handle = BinlogReaderHandle {
        state: Arc::new(AtomicU8::new(ReaderState::Idle as u8)),
        gtid: Arc::new(Mutex::new(start_gtid.clone())),
        stop: Arc::new(AtomicBool::new(false)),
    };
    let task_handle = handle.clone();

    let join = tokio::spawn(async move {
        run::<C>(mysql_config, reader_config, start_gtid, event_tx, task_handle).await;
    });

    (handle, join)
}

async fn run<C: SourceConnection + 'static>(
    mysql_config: MysqlConfig,
    reader_config: BinlogReaderConfig,
    start_gtid: Gtid,
    event_tx: mpsc::Sender<SourceEvent>,
    handle: BinlogReaderHandle,
) {
    if reader_config.replica_id == 0 {
        warn!(event = "binlog_reader_invalid_replica_id", "replica_id must be non-zero");
        handle.set_state(ReaderState::Stopped);
        return;
    }

    let mut state = ReaderState::Starting;
    let mut connection: Option<C> = None;
    let mut backoff_ms = reader_config.reconnect_backoff_min_ms;
    let mut events_since_write: u64 = 0;
    handle.set_state(state);

    loop {
        if handle.stop.load(Ordering::SeqCst) && !matches!(state, ReaderState::Streaming) {
            state = ReaderState::Stopped;
        }

        match state {
            ReaderState::Idle => unreachable!("reader always starts in Starting"),
            ReaderState::Starting => {
                match C::open(&mysql_config, &handle.gtid()).await {
                    Ok(mut conn) => match conn.validate_capabilities().await {
                        Ok(()) => {
                            info!(event = "binlog_reader_connected");
                            connection = Some(conn);
                            backoff_ms = reader_config.reconnect_backoff_min_ms;
                            state = ReaderState::Streaming;
                        }
                        Err(e) => {
                            warn!(event = "binlog_reader_validation_failed", error = %e);
                            state = ReaderState::Reconnecting;
                        }
                    },
                    Err(e) => {
                        warn!(event = "binlog_reader_connect_failed", error = %e);
                        state = ReaderState::Reconnecting;
                    }
                }
            }
            ReaderState::Streaming => {
                let conn = connection.as_mut().expect("streaming without a connection");
                if handle.stop.load(Ordering::SeqCst) {
                    let _ = conn.close().await;
                    connection = None;
                    state = ReaderState::Stopped;
                    continue;
                }
                match conn.next_event().await {
                    Ok(event) => {
                        if let SourceEvent::Gtid(ref g) = event {
                            handle.set_gtid(g.clone());
                            events_since_write += 1;
                            if events_since_write >= reader_config.state_write_interval_events {
                                if let Some(path) = &reader_config.state_file_path {
                                    if let Err(e) = state_file::write(path, g) {
                                        warn!(event = "binlog_reader_state_write_failed", error = %e);
                                    }
                                }
                                events_since_write = 0;
                            }
                        }
                        if event_tx.send(event).await.is_err() {
                            state = ReaderState::Stopped;
                        }
                    }
                    Err(e) => {
                        warn!(event = "binlog_reader_stream_error", error = %e);
                        state = ReaderState::Reconnecting;
                    }
                }
            }
            ReaderState::Reconnecting => {
                if handle.stop.load(Ordering::SeqCst) {
                    state = ReaderState::Stopped;
                    continue;
                }
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(reader_config.reconnect_backoff_max_ms);
                state = ReaderState::Starting;
            }
            ReaderState::Stopped => {
                handle.set_state(ReaderState::Stopped);
                break;
            }
        }
        handle.set_state(state);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for s in [
            ReaderState::Idle,
            ReaderState::Starting,
            ReaderState::Streaming,
            ReaderState::Reconnecting,
            ReaderState::Stopped,
        ] {
            assert_eq!(ReaderState::from_u8(s as u8), s);
        }
    }
}
