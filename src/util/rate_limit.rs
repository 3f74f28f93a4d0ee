//! Per-connection input throttling

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default inbound frames per second for one connection
pub const DEFAULT_INPUT_RATE: u32 = 30;

/// Throttles one connection's inbound frames and counts what it drops
pub struct InputThrottle {
    limiter: Limiter,
    dropped: u64,
}

impl InputThrottle {
    /// Allow `rate` frames per second, bursting up to `rate`
    pub fn per_second(rate: u32) -> Self {
        let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            dropped: 0,
        }
    }

    /// Whether the next frame may be processed
    pub fn admit(&mut self) -> bool {
        let allowed = self.limiter.check().is_ok();
        if !allowed {
            self.dropped += 1;
        }
        allowed
    }

    /// Frames refused so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for InputThrottle {
    fn default() -> Self {
        Self::per_second(DEFAULT_INPUT_RATE)
    }
}
