use core::error::Error;
use core::fmt;

/// Failure to construct a request, response or header collection from the
/// caller's parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BuildError {
    /// The authority component was empty.
    EmptyAuthority,
    /// The authority component did not parse for the requested scheme.
    InvalidAuthority(String),
    /// The combined path and query did not parse.
    InvalidPathWithQuery(String),
    /// The method string could not be used as an HTTP method.
    InvalidMethod(String),
    /// The scheme string could not be used as a URI scheme.
    InvalidScheme(String),
    /// A header name was empty or not a valid field name on the wire.
    InvalidHeaderName(String),
    /// A header value contained bytes that cannot appear in a field value.
    InvalidHeaderValue(String),
    /// The status code was outside `100..=599`.
    InvalidStatus(u16),
    /// A handle passed to the builder does not refer to a live resource.
    UnknownHandle(u32),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAuthority => write!(f, "authority must not be empty"),
            Self::InvalidAuthority(a) => write!(f, "invalid authority: {a:?}"),
            Self::InvalidPathWithQuery(p) => write!(f, "invalid path and query: {p:?}"),
            Self::InvalidMethod(m) => write!(f, "invalid method: {m:?}"),
            Self::InvalidScheme(s) => write!(f, "invalid scheme: {s:?}"),
            Self::InvalidHeaderName(n) => write!(f, "invalid header name: {n:?}"),
            Self::InvalidHeaderValue(n) => write!(f, "invalid value for header {n:?}"),
            Self::InvalidStatus(s) => write!(f, "status code out of range: {s}"),
            Self::UnknownHandle(h) => write!(f, "unknown handle: {h}"),
        }
    }
}

impl Error for BuildError {}

/// I/O failure or use-after-close on a body stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StreamError {
    /// The stream is closed: the parent was sent or released, the peer went
    /// away, or the handle itself was already released.
    Closed,
    /// The transport failed while moving body bytes.
    Transport(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "body stream is closed"),
            Self::Transport(msg) => write!(f, "body transport failed: {msg}"),
        }
    }
}

impl Error for StreamError {}

/// Transport-level failure of an exchange, surfaced through the response
/// future. Terminal for that exchange only.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExchangeError {
    /// A connection to the authority could not be established.
    ConnectionRefused,
    /// A caller-supplied timeout elapsed before the response arrived.
    Timeout,
    /// The peer violated the protocol or the transport failed mid-exchange.
    ProtocolError(Option<String>),
    /// The request could not be sent as constructed.
    InvalidRequest(Option<String>),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::Timeout => write!(f, "exchange timed out"),
            Self::ProtocolError(None) => write!(f, "protocol error"),
            Self::ProtocolError(Some(msg)) => write!(f, "protocol error: {msg}"),
            Self::InvalidRequest(None) => write!(f, "invalid request"),
            Self::InvalidRequest(Some(msg)) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl Error for ExchangeError {}

/// A single-use operation was invoked a second time on the same resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AlreadyConsumedError;

impl fmt::Display for AlreadyConsumedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body was already consumed")
    }
}

impl Error for AlreadyConsumedError {}

/// The response outparam was already filled for this inbound request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AlreadySetError;

impl fmt::Display for AlreadySetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response outparam was already set")
    }
}

impl Error for AlreadySetError {}

/// A handle was used after its entry was released from the table.
///
/// Releasing twice is a caller bug, but a reported one: the operation is a
/// no-op and this error identifies the stale handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UseAfterReleaseError {
    /// The stale handle id.
    pub handle: u32,
}

impl fmt::Display for UseAfterReleaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle {} was already released", self.handle)
    }
}

impl Error for UseAfterReleaseError {}
