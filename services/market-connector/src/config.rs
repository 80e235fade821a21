//! Connector settings
//!
//! Read once at client start; the parse-failure threshold comes from the
//! environment so operators can tune quarantine without a rebuild.

use std::time::Duration;

/// Environment variable holding the parse-failure threshold
pub const MAX_MSG_FAILURES_ENV: &str = "CCXT_MAX_MSG_FAILURES";

/// Default parse-failure threshold per rolling window
pub const DEFAULT_MAX_MSG_FAILURES: u32 = 100;

/// Rolling window over which parse failures accumulate
pub const FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Process-level settings for all stream clients
#[derive(Clone, Copy, Debug)]
pub struct ConnectorSettings {
    /// Parse failures tolerated inside one rolling window
    pub max_msg_failures: u32,
    /// Rolling window length
    pub failure_window: Duration,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            max_msg_failures: DEFAULT_MAX_MSG_FAILURES,
            failure_window: FAILURE_WINDOW,
        }
    }
}

impl ConnectorSettings {
    /// Read settings from the environment, falling back to defaults
    #[must_use]
    pub fn from_env() -> Self {
        let max_msg_failures = std::env::var(MAX_MSG_FAILURES_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_MSG_FAILURES);
        Self {
            max_msg_failures,
            failure_window: FAILURE_WINDOW,
        }
    }
}
