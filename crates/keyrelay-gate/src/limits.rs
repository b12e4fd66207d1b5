//! Rate-limit settings.

use std::time::Duration;

use crate::error::{GateError, Result};

/// Requests a passkey may make per window unless configured otherwise.
pub const DEFAULT_MAX_REQUESTS: u64 = 100;

/// Window length unless configured otherwise.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Fixed-window request ceiling applied per passkey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    max_requests: u64,
    window: Duration,
}

impl RateLimitConfig {
    /// Both values must be non-zero.
    pub fn new(max_requests: u64, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(GateError::InvalidConfig(
                "max requests must be at least 1".into(),
            ));
        }
        if window.as_millis() == 0 {
            return Err(GateError::InvalidConfig(
                "window must be at least 1ms".into(),
            ));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub(crate) fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}
