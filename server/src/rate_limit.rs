use governor::state::{InMemoryState, NotKeyed};
use governor::{clock::DefaultClock, Quota, RateLimiter as GovernorLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::RwLock;

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-connection admission rate limiter (spec §2 component, `api.rate_limiting`).
/// A token-bucket of `capacity` tokens refilled at `refill_rate`/sec, rebuilt
/// in place whenever `SET api.rate_limiting.*` changes the quota — mirroring
/// how `cache::ResultCache` is reconfigured live rather than replaced.
pub struct RateLimiterHandle {
    inner: RwLock<Option<DirectLimiter>>,
}

impl RateLimiterHandle {
    pub fn new(enabled: bool, capacity: u32, refill_rate: u32) -> Self {
        let handle = RateLimiterHandle { inner: RwLock::new(None) };
        if enabled {
            handle.reconfigure(capacity, refill_rate);
        }
        handle
    }

    pub fn disabled() -> Self {
        RateLimiterHandle { inner: RwLock::new(None) }
    }

    /// Replaces the limiter with a fresh bucket of the given shape. Passing
    /// `0` for either parameter disables rate limiting entirely.
    pub fn reconfigure(&self, capacity: u32, refill_rate: u32) {
        let mut guard = self.inner.write().expect("rate limiter lock poisoned");
        if capacity == 0 || refill_rate == 0 {
            *guard = None;
            return;
        }
        let burst = NonZeroU32::new(capacity).unwrap_or(nonzero!(1u32));
        let per_second = NonZeroU32::new(refill_rate).unwrap_or(nonzero!(1u32));
        let quota = Quota::per_second(per_second).allow_burst(burst);
        *guard = Some(GovernorLimiter::direct(quota));
    }

    pub fn disable(&self) {
        *self.inner.write().expect("rate limiter lock poisoned") = None;
    }

    /// `true` if the request should proceed, `false` if it must be rejected
    /// with `ERROR rate limited` (spec §5, admission gates).
    pub fn check(&self) -> bool {
        match self.inner.read().expect("rate limiter lock poisoned").as_ref() {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn disabled_limiter_always_allows() {
        let rl = RateLimiterHandle::disabled();
        for _ in 0..100 {
            assert!(rl.check());
        }
    }

    #[test]
    fn small_burst_eventually_rejects() {
        let rl = RateLimiterHandle::new(true, 1, 1);
        assert!(rl.check());
        assert!(!rl.check());
    }

    #[test]
    fn reconfigure_to_zero_disables() {
        let rl = RateLimiterHandle::new(true, 1, 1);
        rl.reconfigure(0, 0);
        for _ in 0..10 {
            assert!(rl.check());
        }
    }
}
