//! Core timing configuration

use std::time::Duration;

/// Tunable windows for the ephemeral state trackers and the sweeper.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Typing indicator lifetime without a refresh
    pub typing_ttl: Duration,
    /// Presence liveness window; an agent with no ping inside the window is
    /// considered offline even without an explicit disconnect
    pub presence_window: Duration,
    /// Interval between background eviction sweeps
    pub sweep_interval: Duration,
    /// Messages returned per page when no explicit limit is given
    pub default_page_size: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            typing_ttl: Duration::from_secs(2),
            presence_window: Duration::from_secs(45),
            sweep_interval: Duration::from_secs(5),
            default_page_size: 50,
        }
    }
}
