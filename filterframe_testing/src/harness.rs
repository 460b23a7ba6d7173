//! In-memory connection harness.
//!
//! Spawns a [`FilterDispatcher`] between two [`ChannelTransport`]s and exposes
//! the frames each side receives.

use bytes::Bytes;
use filterframe::{
    ApiKey,
    Body,
    DispatchError,
    DispatcherConfig,
    DispatcherHandle,
    FilterChain,
    FilterDispatcher,
    Frame,
    Header,
    transport::ChannelTransport,
};
use tokio::{sync::mpsc, task::JoinHandle};

/// A running dispatcher wired to channel transports.
pub struct Harness {
    /// Handle feeding the dispatcher.
    pub handle: DispatcherHandle,
    /// Frames written towards the backend.
    pub backend: mpsc::UnboundedReceiver<Frame>,
    /// Frames written towards the client.
    pub client: mpsc::UnboundedReceiver<Frame>,
    worker: JoinHandle<()>,
}

impl Harness {
    /// Spawn a dispatcher running `chain` with `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(chain: FilterChain, config: DispatcherConfig) -> Self {
        let (backend_tx, backend) = ChannelTransport::pair();
        let (client_tx, client) = ChannelTransport::pair();
        let (dispatcher, handle) = FilterDispatcher::new(chain, config, backend_tx, client_tx);
        let worker = tokio::spawn(dispatcher.run());
        Self {
            handle,
            backend,
            client,
            worker,
        }
    }

    /// Spawn a dispatcher with default timeouts.
    pub fn with_chain(chain: FilterChain) -> Self { Self::start(chain, DispatcherConfig::default()) }

    /// Submit a client request and wait until the worker has processed it.
    ///
    /// # Panics
    ///
    /// Panics if the connection is already closed.
    pub async fn request(&self, frame: Frame) {
        self.handle
            .client_request(frame)
            .expect("connection closed before request");
        self.settle().await;
    }

    /// Submit a backend response and wait until the worker has processed it.
    ///
    /// # Panics
    ///
    /// Panics if the connection is already closed.
    pub async fn respond(&self, frame: Frame) {
        self.handle
            .backend_response(frame)
            .expect("connection closed before response");
        self.settle().await;
    }

    /// Wait until the worker has processed every submitted event.
    ///
    /// Returns immediately once the connection has closed.
    pub async fn settle(&self) { let _ = self.handle.flush().await; }

    /// Frames received by the backend so far.
    pub fn backend_frames(&mut self) -> Vec<Frame> { drain(&mut self.backend) }

    /// Frames received by the client so far.
    pub fn client_frames(&mut self) -> Vec<Frame> { drain(&mut self.client) }

    /// Returns `true` once the connection has closed.
    pub fn is_closed(&self) -> bool { self.handle.is_closed() }

    /// Submit a frame, reporting whether the connection accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] after the connection closed.
    pub fn try_request(&self, frame: Frame) -> Result<(), DispatchError> {
        self.handle.client_request(frame)
    }

    /// Close the connection and wait for the worker to exit.
    ///
    /// # Panics
    ///
    /// Panics if the worker panicked.
    pub async fn shutdown(self) {
        self.handle.close();
        self.worker.await.expect("dispatcher worker panicked");
    }

    /// Wait for the worker to exit on its own.
    ///
    /// # Panics
    ///
    /// Panics if the worker panicked.
    pub async fn join(self) { self.worker.await.expect("dispatcher worker panicked"); }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Build a decoded client request with `payload`.
pub fn request(api_key: ApiKey, correlation_id: i32, payload: &'static [u8]) -> Frame {
    Frame::request(
        Header::request(api_key, 0, correlation_id).with_client_id("test-client"),
        Body::new(Bytes::from_static(payload)),
    )
}

/// Build a produce request with the given acknowledgement level.
pub fn produce(correlation_id: i32, acks: i16) -> Frame {
    Frame::request(
        Header::request(ApiKey::PRODUCE, 9, correlation_id),
        Body::produce(acks, Bytes::from_static(b"records")),
    )
}

/// Build a decoded backend response with `payload`.
pub fn response(correlation_id: i32, payload: &'static [u8]) -> Frame {
    Frame::response(
        Header::response(correlation_id),
        Body::new(Bytes::from_static(payload)),
    )
}

/// Payloads of `frames`, in order.
pub fn payloads(frames: &[Frame]) -> Vec<Bytes> {
    frames
        .iter()
        .map(|frame| match &frame.payload {
            filterframe::frame::Payload::Decoded(body) => body.payload().clone(),
            filterframe::frame::Payload::Opaque(bytes) => bytes.clone(),
        })
        .collect()
}

/// Correlation ids of `frames`, in order.
pub fn correlation_ids(frames: &[Frame]) -> Vec<i32> { frames.iter().map(Frame::correlation_id).collect() }
