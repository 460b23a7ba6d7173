//! Cloneable handle feeding a connection worker.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::event::WorkerEvent;
use crate::{error::DispatchError, frame::Frame};

struct HandleInner {
    events: mpsc::UnboundedSender<WorkerEvent>,
    shutdown: CancellationToken,
}

impl Drop for HandleInner {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

/// Submits frames to a [`FilterDispatcher`](super::FilterDispatcher) from the
/// codec side of a connection.
///
/// Dropping the last handle closes the connection.
#[derive(Clone)]
pub struct DispatcherHandle(Arc<HandleInner>);

impl DispatcherHandle {
    pub(super) fn new(events: mpsc::UnboundedSender<WorkerEvent>, shutdown: CancellationToken) -> Self {
        Self(Arc::new(HandleInner { events, shutdown }))
    }

    /// Submit a request received from the client.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the connection has closed.
    pub fn client_request(&self, frame: Frame) -> Result<(), DispatchError> {
        self.submit(WorkerEvent::ClientRequest(frame))
    }

    /// Submit a response received from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the connection has closed.
    pub fn backend_response(&self, frame: Frame) -> Result<(), DispatchError> {
        self.submit(WorkerEvent::BackendResponse(frame))
    }

    /// Wait until the worker has processed everything submitted before this
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the connection closed first.
    pub async fn flush(&self) -> Result<(), DispatchError> {
        let (tx, rx) = oneshot::channel();
        self.submit(WorkerEvent::Flush(tx))?;
        rx.await.map_err(|_| DispatchError::Closed)
    }

    /// Request the connection to close.
    pub fn close(&self) { self.0.shutdown.cancel(); }

    /// Returns `true` once the connection is closed or closing.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.shutdown.is_cancelled() }

    /// Resolve once the connection is closed or closing.
    pub async fn closed(&self) { self.0.shutdown.cancelled().await; }

    fn submit(&self, event: WorkerEvent) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        self.0.events.send(event).map_err(|_| DispatchError::Closed)
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
