//! Default values applied when configuration leaves a setting out.

/// Human-readable application description printed by `--version`.
pub const APPLICATION_DESCRIPTION: &str = "TaskQ Redis Subscriber";

pub mod queue {
    /// Channel (list key) popped when the configuration names none.
    pub const DEFAULT_CHANNEL: &str = "junk";
    /// Queue endpoint used when neither the CLI nor the file sets one.
    pub const DEFAULT_ADDRESS: &str = "127.0.0.1:6379";
}

pub mod consumer {
    /// Concurrent pipeline tasks allowed before the dequeue loop waits.
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 1000;
    pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 50;
    pub const DEFAULT_BACKOFF_MAX_MS: u64 = 5_000;
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
}

pub mod metrics {
    /// Seconds between two verbose metrics snapshots.
    pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 60;
}
