//! Frame model handed between the external codec and the dispatcher.
//!
//! A [`Frame`] is one protocol message in flight. Its [`Payload`] is either a
//! decoded [`Body`] that filters may inspect and replace, or opaque bytes the
//! codec did not decode because no filter asked for them. Once a frame is
//! handed to a [`crate::transport::Transport`] the dispatcher no longer owns
//! it.

mod api;
mod extensions;

pub use api::ApiKey;
use bytes::Bytes;
pub use extensions::Extensions;

/// Direction a frame travels through the proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client towards backend.
    Request,
    /// Backend towards client.
    Response,
}

impl Direction {
    /// Lower-case label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Identity of a filter within its chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FilterId {
    index: usize,
    name: std::sync::Arc<str>,
}

impl FilterId {
    pub(crate) fn new(index: usize, name: std::sync::Arc<str>) -> Self { Self { index, name } }

    /// Position of the filter in the configured chain.
    #[must_use]
    pub fn index(&self) -> usize { self.index }

    /// Configured name of the filter.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }
}

impl std::fmt::Display for FilterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.index)
    }
}

/// Who produced a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// The remote client, or the backend answering the client.
    Client,
    /// A filter issuing an out-of-band request, or the backend answering it.
    Filter(FilterId),
}

/// Protocol header shared by requests and responses.
///
/// Responses carry the api key and version of the request they answer; the
/// dispatcher restores them from its correlation registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Message type.
    pub api_key: ApiKey,
    /// Schema version of the message.
    pub api_version: i16,
    /// Identifier linking a request to its response.
    pub correlation_id: i32,
    /// Client identifier, present on requests only.
    pub client_id: Option<String>,
}

impl Header {
    /// Build a request header.
    #[must_use]
    pub fn request(api_key: ApiKey, api_version: i16, correlation_id: i32) -> Self {
        Self {
            api_key,
            api_version,
            correlation_id,
            client_id: None,
        }
    }

    /// Build a response header for the given correlation id.
    ///
    /// The api key and version are filled in when the response is matched to
    /// its request.
    #[must_use]
    pub fn response(correlation_id: i32) -> Self {
        Self {
            api_key: ApiKey::UNKNOWN,
            api_version: 0,
            correlation_id,
            client_id: None,
        }
    }

    /// Attach a client identifier.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Decoded message body.
///
/// The schema-specific content lives in `payload`, produced and consumed by the
/// external codec. `acks` mirrors the acknowledgement level of produce
/// requests, the only schema detail the dispatcher relies on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Body {
    payload: Bytes,
    extensions: Extensions,
    acks: Option<i16>,
}

impl Body {
    /// Wrap an encoded payload.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            extensions: Extensions::default(),
            acks: None,
        }
    }

    /// Build a produce request body with the given acknowledgement level.
    #[must_use]
    pub fn produce(acks: i16, payload: impl Into<Bytes>) -> Self {
        Self {
            acks: Some(acks),
            ..Self::new(payload)
        }
    }

    /// Encoded message content.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Replace the encoded message content.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) { self.payload = payload.into(); }

    /// Acknowledgement level for produce requests.
    #[must_use]
    pub fn acks(&self) -> Option<i16> { self.acks }

    /// Extension side channel.
    #[must_use]
    pub fn extensions(&self) -> &Extensions { &self.extensions }

    /// Mutable extension side channel.
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Whether a request with this body receives a response.
    ///
    /// Produce requests sent with `acks = 0` are fire-and-forget.
    #[must_use]
    pub fn expects_response(&self, api_key: ApiKey) -> bool {
        !(api_key == ApiKey::PRODUCE && self.acks == Some(0))
    }
}

/// Frame content as handed over by the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Body decoded because at least one filter claims this api key.
    Decoded(Body),
    /// Raw bytes passed through without inspection.
    Opaque(Bytes),
}

/// One protocol message in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Travel direction.
    pub direction: Direction,
    /// Producer of the frame.
    pub origin: Origin,
    /// Protocol header.
    pub header: Header,
    /// Decoded or opaque content.
    pub payload: Payload,
}

impl Frame {
    /// Build a decoded client request.
    #[must_use]
    pub fn request(header: Header, body: Body) -> Self {
        Self {
            direction: Direction::Request,
            origin: Origin::Client,
            header,
            payload: Payload::Decoded(body),
        }
    }

    /// Build a decoded response.
    #[must_use]
    pub fn response(header: Header, body: Body) -> Self {
        Self {
            direction: Direction::Response,
            origin: Origin::Client,
            header,
            payload: Payload::Decoded(body),
        }
    }

    /// Build a frame whose content the codec left undecoded.
    #[must_use]
    pub fn opaque(direction: Direction, header: Header, bytes: impl Into<Bytes>) -> Self {
        Self {
            direction,
            origin: Origin::Client,
            header,
            payload: Payload::Opaque(bytes.into()),
        }
    }

    /// Correlation id from the header.
    #[must_use]
    pub fn correlation_id(&self) -> i32 { self.header.correlation_id }

    /// Decoded body, if the frame was decoded.
    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        match &self.payload {
            Payload::Decoded(body) => Some(body),
            Payload::Opaque(_) => None,
        }
    }

    /// Whether the backend answers this request.
    ///
    /// Opaque requests cannot be inspected and are assumed to expect a
    /// response.
    #[must_use]
    pub fn expects_response(&self) -> bool {
        self.body()
            .is_none_or(|body| body.expects_response(self.header.api_key))
    }
}
