//! Cross-thread resolution of deferred filter decisions.
//!
//! A [`Promise`] may be moved to any thread. Resolving it never touches the
//! dispatcher's state directly: it settles a shared cell exactly once and posts
//! the outcome to the connection worker's event queue, where the decision is
//! applied on the worker's own thread of control.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use tokio::sync::mpsc;

use super::result::{ContinuationId, FilterOutcome, FilterResult};
use crate::{
    dispatcher::WorkerEvent,
    error::{FilterError, FilterErrorKind},
};

const PENDING: u8 = 0;
const RESOLVED: u8 = 1;
const FAILED: u8 = 2;
const PANICKED: u8 = 3;
const TIMED_OUT: u8 = 4;
const CANCELLED: u8 = 5;
const UNSUPPORTED: u8 = 6;

/// Observable state of a continuation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromiseState {
    /// No outcome yet.
    Pending,
    /// The filter supplied a result.
    Resolved,
    /// Completed exceptionally.
    Failed(FilterErrorKind),
}

/// Settle-once state shared between a promise and the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct ContinuationCell(AtomicU8);

impl ContinuationCell {
    /// Move from pending to the state matching `outcome`.
    ///
    /// Returns `false` if the cell was already settled.
    pub(crate) fn settle(&self, outcome: Result<(), FilterErrorKind>) -> bool {
        let next = match outcome {
            Ok(()) => RESOLVED,
            Err(FilterErrorKind::Failed) => FAILED,
            Err(FilterErrorKind::Panicked) => PANICKED,
            Err(FilterErrorKind::Timeout) => TIMED_OUT,
            Err(FilterErrorKind::Closed) => CANCELLED,
            Err(FilterErrorKind::Unsupported) => UNSUPPORTED,
        };
        self.0
            .compare_exchange(PENDING, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn state(&self) -> PromiseState {
        match self.0.load(Ordering::Acquire) {
            PENDING => PromiseState::Pending,
            RESOLVED => PromiseState::Resolved,
            FAILED => PromiseState::Failed(FilterErrorKind::Failed),
            PANICKED => PromiseState::Failed(FilterErrorKind::Panicked),
            TIMED_OUT => PromiseState::Failed(FilterErrorKind::Timeout),
            UNSUPPORTED => PromiseState::Failed(FilterErrorKind::Unsupported),
            _ => PromiseState::Failed(FilterErrorKind::Closed),
        }
    }
}

/// A pending filter invocation, tied to its cell.
#[derive(Clone, Debug)]
pub(crate) struct Continuation {
    pub(crate) id: ContinuationId,
    pub(crate) cell: Arc<ContinuationCell>,
}

impl Continuation {
    pub(crate) fn new(id: ContinuationId) -> Self {
        Self {
            id,
            cell: Arc::new(ContinuationCell::default()),
        }
    }
}

/// Resolver for a deferred filter decision.
///
/// Cloning yields another resolver for the same continuation; only the first
/// resolution takes effect.
#[derive(Clone)]
pub struct Promise {
    continuation: Continuation,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Promise {
    pub(crate) fn new(continuation: Continuation, events: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self {
            continuation,
            events,
        }
    }

    /// Complete with `result`.
    ///
    /// Returns `false`, without effect, if the continuation has already been
    /// resolved, timed out or cancelled by connection close.
    pub fn resolve(&self, result: FilterResult) -> bool { self.settle(Ok(result)) }

    /// Complete exceptionally. The connection is closed.
    ///
    /// Returns `false`, without effect, if the continuation was already
    /// settled.
    pub fn fail(&self, error: FilterError) -> bool { self.settle(Err(error)) }

    /// Current state of the continuation.
    #[must_use]
    pub fn state(&self) -> PromiseState { self.continuation.cell.state() }

    /// Returns `true` once the continuation has left the pending state.
    #[must_use]
    pub fn is_settled(&self) -> bool { self.state() != PromiseState::Pending }

    fn settle(&self, outcome: FilterOutcome) -> bool {
        let marker = match &outcome {
            Ok(_) => Ok(()),
            Err(error) => Err(error.kind()),
        };
        if !self.continuation.cell.settle(marker) {
            return false;
        }
        // The worker only disappears after cancelling every active
        // continuation, so a failed send means the outcome is moot.
        let _ = self.events.send(WorkerEvent::Resolved {
            id: self.continuation.id,
            outcome,
        });
        true
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.continuation.id)
            .field("state", &self.state())
            .finish()
    }
}
