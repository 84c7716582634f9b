use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static LOG_REOPEN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn handle_signal(sig: libc::c_int) {
    match sig {
        libc::SIGINT | libc::SIGTERM => SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst),
        libc::SIGUSR1 => LOG_REOPEN_REQUESTED.store(true, Ordering::SeqCst),
        _ => {}
    }
}

/// Installs the process's signal handlers. Handlers only set atomic flags;
/// the orchestrator polls them from ordinary (non-signal) context, matching
/// the async-signal-safe discipline of the original daemon's signal manager.
/// SIGPIPE is ignored process-wide so a client disconnecting mid-write turns
/// into an `EPIPE` on the socket instead of killing the process.
pub struct SignalManager;

impl SignalManager {
    #[cfg(unix)]
    pub fn install() -> Self {
        unsafe {
            libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
            libc::signal(libc::SIGUSR1, handle_signal as libc::sighandler_t);
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
        SignalManager
    }

    #[cfg(not(unix))]
    pub fn install() -> Self {
        SignalManager
    }

    pub fn is_shutdown_requested() -> bool {
        SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
    }

    /// Consumes the pending log-reopen request, if any, so a single SIGUSR1
    /// triggers exactly one reopen.
    pub fn consume_log_reopen_request() -> bool {
        LOG_REOPEN_REQUESTED.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_reopen_request_is_consumed_once() {
        LOG_REOPEN_REQUESTED.store(true, Ordering::SeqCst);
        assert!(SignalManager::consume_log_reopen_request());
        assert!(!SignalManager::consume_log_reopen_request());
    }
}
