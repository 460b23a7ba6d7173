//! Boundary towards the backend and client connections.
//!
//! The dispatcher hands forwarded frames to a [`Transport`] and never encodes
//! them itself. Ownership of a frame passes to the transport on `accept`.

use tokio::sync::mpsc;

use crate::{error::TransportClosed, frame::Frame};

/// Outbound connection abstraction accepting frames.
pub trait Transport: Send + 'static {
    /// Take ownership of `frame` for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`TransportClosed`] if the connection can no longer accept
    /// frames. The dispatcher closes the connection in response.
    fn accept(&mut self, frame: Frame) -> Result<(), TransportClosed>;

    /// Returns `true` once the connection has closed.
    fn is_closed(&self) -> bool;

    /// Close the connection. Called once when the dispatcher closes.
    fn close(&mut self) {}
}

/// [`Transport`] delivering frames into an unbounded channel.
///
/// ```
/// use filterframe::{
///     frame::{ApiKey, Body, Frame, Header},
///     transport::{ChannelTransport, Transport},
/// };
///
/// let (mut transport, mut rx) = ChannelTransport::pair();
/// let frame = Frame::request(Header::request(ApiKey::METADATA, 12, 1), Body::default());
/// transport.accept(frame.clone()).expect("receiver alive");
/// assert_eq!(rx.try_recv().ok(), Some(frame));
/// ```
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

impl ChannelTransport {
    /// Create a transport and the receiver observing its frames.
    ///
    /// The receiver yields `None` once the transport is closed or dropped.
    #[must_use]
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }
}

impl Transport for ChannelTransport {
    fn accept(&mut self, frame: Frame) -> Result<(), TransportClosed> {
        let tx = self.tx.as_ref().ok_or(TransportClosed)?;
        tx.send(frame).map_err(|_| TransportClosed)
    }

    fn is_closed(&self) -> bool { self.tx.as_ref().is_none_or(mpsc::UnboundedSender::is_closed) }

    fn close(&mut self) { self.tx = None; }
}
