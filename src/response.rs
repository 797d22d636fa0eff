use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::combinators::BoxBody;
use tokio::sync::{mpsc, oneshot};

use crate::body::{body_channel, BodyReader, BodyWriter, ChannelBody};
use crate::table::Handle;
use crate::{BuildError, ExchangeError, Fields, StreamError};

/// The resource behind an incoming response handle: status, headers, and a
/// body that may be consumed exactly once.
pub struct IncomingResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: Fields,
    pub(crate) headers_handle: Option<Handle<Fields>>,
    pub(crate) body: IncomingBodyState,
    pub(crate) reader: Option<Handle<BodyReader>>,
}

pub(crate) enum IncomingBodyState {
    Ready(BoxBody<Bytes, StreamError>),
    Consumed,
}

impl IncomingResponse {
    pub(crate) fn from_http(response: http::Response<BoxBody<Bytes, StreamError>>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            headers: Fields::from_header_map(&parts.headers),
            headers_handle: None,
            body: IncomingBodyState::Ready(body),
            reader: None,
        }
    }
}

/// The resource behind a server-built response handle.
///
/// The handler binds it to the inbound request through the response
/// outparam; body bytes written afterwards stream to the client until the
/// handle (or its owning context) is released.
#[derive(Debug)]
pub struct OutgoingResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body_tx: mpsc::Sender<Bytes>,
    pub(crate) body_rx: Option<mpsc::Receiver<Bytes>>,
    pub(crate) writer: Option<Handle<BodyWriter>>,
}

impl OutgoingResponse {
    pub(crate) fn new(status: u16, headers: &Fields) -> Result<Self, BuildError> {
        if !(100..=599).contains(&status) {
            return Err(BuildError::InvalidStatus(status));
        }
        let status = StatusCode::from_u16(status).map_err(|_| BuildError::InvalidStatus(status))?;
        let headers = headers.to_header_map()?;
        let (body_tx, body_rx) = body_channel();
        Ok(Self {
            status,
            headers,
            body_tx,
            body_rx: Some(body_rx),
            writer: None,
        })
    }

    /// Package the response head and body channel for the connection.
    /// Returns `None` once the response has already been bound.
    pub(crate) fn take_http(&mut self) -> Option<http::Response<ChannelBody>> {
        let body_rx = self.body_rx.take()?;
        let mut response = http::Response::new(ChannelBody::new(body_rx));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        Some(response)
    }
}

/// What a server handler sends back through the outparam: a response head
/// whose body streams from the handler, or a terminal error.
pub type OutparamResult = Result<http::Response<ChannelBody>, ExchangeError>;

/// The resource behind a response outparam handle: a write-once slot tied
/// to one inbound request.
pub struct ResponseOutparam {
    pub(crate) sender: Option<oneshot::Sender<OutparamResult>>,
}

impl ResponseOutparam {
    pub(crate) fn new(sender: oneshot::Sender<OutparamResult>) -> Self {
        Self {
            sender: Some(sender),
        }
    }
}
