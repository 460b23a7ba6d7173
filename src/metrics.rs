//! Metric helpers for `filterframe`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. With the
//! `metrics` feature disabled the helpers compile to no-ops.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::{error::FilterErrorKind, frame::Direction};

/// Name of the gauge tracking live dispatchers.
pub const DISPATCHERS_ACTIVE: &str = "filterframe_dispatchers_active";
/// Name of the counter tracking frames handed to a transport.
pub const FRAMES_FORWARDED: &str = "filterframe_frames_forwarded_total";
/// Name of the counter tracking frames dropped by filters.
pub const FRAMES_DROPPED: &str = "filterframe_frames_dropped_total";
/// Name of the counter tracking failed filter continuations.
pub const FILTER_FAILURES: &str = "filterframe_filter_failures_total";
/// Name of the counter tracking out-of-band requests issued by filters.
pub const OUT_OF_BAND_REQUESTS: &str = "filterframe_out_of_band_requests_total";

/// Dispatchers whose connection has not closed yet.
static LIVE_DISPATCHERS: AtomicU64 = AtomicU64::new(0);

/// Membership of one dispatcher in [`DISPATCHERS_ACTIVE`].
///
/// Held by the dispatcher from construction until its connection closes;
/// the gauge and [`active_dispatcher_count`] follow its lifetime.
#[derive(Debug)]
pub(crate) struct LiveDispatcher(());

impl LiveDispatcher {
    pub(crate) fn register() -> Self {
        LIVE_DISPATCHERS.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        gauge!(DISPATCHERS_ACTIVE).increment(1.0);
        Self(())
    }
}

impl Drop for LiveDispatcher {
    fn drop(&mut self) {
        LIVE_DISPATCHERS.fetch_sub(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        gauge!(DISPATCHERS_ACTIVE).decrement(1.0);
    }
}

/// Number of dispatchers whose connection has not closed yet.
#[must_use]
pub fn active_dispatcher_count() -> u64 { LIVE_DISPATCHERS.load(Ordering::Relaxed) }

/// Record a frame handed to a transport.
pub fn inc_forwarded(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_FORWARDED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a frame dropped by a filter.
pub fn inc_dropped(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_DROPPED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a failed continuation.
pub fn inc_failures(kind: FilterErrorKind) {
    #[cfg(feature = "metrics")]
    counter!(FILTER_FAILURES, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record an out-of-band request written to the backend.
pub fn inc_out_of_band() {
    #[cfg(feature = "metrics")]
    counter!(OUT_OF_BAND_REQUESTS).increment(1);
}
