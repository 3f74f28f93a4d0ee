//! Clock helpers for the transport and the health endpoint

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::Utc;

/// Default match loop rate
pub const SIMULATION_TPS: u32 = 30;

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Record process start; later calls keep the first value
pub fn init_server_time() {
    STARTED_AT.get_or_init(Instant::now);
}

pub fn uptime_secs() -> u64 {
    STARTED_AT.get().map_or(0, |started| started.elapsed().as_secs())
}

/// Wall clock in Unix milliseconds, zero before the epoch
pub fn unix_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Milliseconds in a duration, saturating
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
