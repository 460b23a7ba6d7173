//! Dispatcher configuration.
//!
//! One timeout per direction bounds every pending filter continuation in that
//! direction. Values are clamped between one millisecond and 24 hours.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower bound applied to configured timeouts.
pub const MIN_TIMEOUT_MS: u64 = 1;
/// Upper bound applied to configured timeouts (24 h).
pub const MAX_TIMEOUT_MS: u64 = 86_400_000;
/// Timeout used when none is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;

/// Timeouts applied by a [`crate::dispatcher::FilterDispatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    request_timeout_ms: u64,
    response_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl DispatcherConfig {
    /// Use the same timeout for both directions.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::default()
            .request_timeout(timeout)
            .response_timeout(timeout)
    }

    /// Configure the request-direction timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = clamp_ms(timeout);
        self
    }

    /// Configure the response-direction timeout.
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = clamp_ms(timeout);
        self
    }

    /// Timeout for request-direction continuations and out-of-band requests.
    #[must_use]
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS))
    }

    /// Timeout for response-direction continuations.
    #[must_use]
    pub fn response_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS))
    }
}

fn clamp_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis())
        .unwrap_or(MAX_TIMEOUT_MS)
        .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
}
