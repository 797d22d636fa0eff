use core::pin::Pin;
use core::task::{ready, Context, Poll};
use core::time::Duration;

use bytes::Bytes;
use http_body::Frame;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt as _;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval};

use crate::table::Handle;
use crate::{OutgoingRequest, StreamError};

/// Capacity of the channel carrying server response body chunks.
pub(crate) const BODY_CHANNEL_CAPACITY: usize = 1;

pub(crate) fn body_channel() -> (mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
    mpsc::channel(BODY_CHANNEL_CAPACITY)
}

/// Where bytes written through a [`BodyWriter`] handle end up.
pub(crate) enum WriterTarget {
    /// Buffered into the parent request, flushed on dispatch.
    Request(Handle<OutgoingRequest>),
    /// Streamed into the response body channel.
    Response(mpsc::Sender<Bytes>),
}

/// The resource behind an outgoing body stream handle.
pub struct BodyWriter {
    pub(crate) target: WriterTarget,
}

/// The resource behind an incoming body stream handle.
///
/// Reads drain a buffered chunk before polling the transport for the next
/// frame. A read that returns data always reports `end_of_stream = false`;
/// end of stream is a separate empty read once the transport is exhausted.
pub struct BodyReader {
    pub(crate) stream: Option<BoxBody<Bytes, StreamError>>,
    pub(crate) buffer: Bytes,
}

impl BodyReader {
    pub(crate) fn new(stream: BoxBody<Bytes, StreamError>) -> Self {
        Self {
            stream: Some(stream),
            buffer: Bytes::new(),
        }
    }

    pub(crate) async fn read(&mut self, max_bytes: usize) -> Result<(Bytes, bool), StreamError> {
        while self.buffer.is_empty() {
            let Some(stream) = &mut self.stream else {
                return Ok((Bytes::new(), true));
            };
            match stream.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.buffer = data;
                    }
                    // Trailer frames are not surfaced through this interface.
                }
                Some(Err(err)) => {
                    self.stream = None;
                    return Err(err);
                }
                None => {
                    self.stream = None;
                    return Ok((Bytes::new(), true));
                }
            }
        }
        let n = self.buffer.len().min(max_bytes);
        Ok((self.buffer.split_to(n), false))
    }
}

/// Response body handed to the connection: chunks written by the handler
/// arrive over a channel and the stream ends when every sender is gone.
pub struct ChannelBody {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelBody {
    pub(crate) fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// An already-terminated body.
    pub(crate) fn closed() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx }
    }
}

impl http_body::Body for ChannelBody {
    type Data = Bytes;
    type Error = core::convert::Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Incoming response body with the between-bytes timeout applied: the timer
/// resets on every frame and fires only while the transport is quiet.
pub(crate) struct TimedBody {
    incoming: hyper::body::Incoming,
    timeout: Interval,
}

impl TimedBody {
    pub(crate) fn new(incoming: hyper::body::Incoming, between_bytes: Duration) -> Self {
        Self {
            incoming,
            timeout: interval_at(Instant::now() + between_bytes, between_bytes),
        }
    }
}

impl http_body::Body for TimedBody {
    type Data = Bytes;
    type Error = StreamError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.incoming).poll_frame(cx) {
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Ready(Some(Err(err))) => {
                Poll::Ready(Some(Err(StreamError::Transport(err.to_string()))))
            }
            Poll::Ready(Some(Ok(frame))) => {
                this.timeout.reset();
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Pending => {
                ready!(this.timeout.poll_tick(cx));
                Poll::Ready(Some(Err(StreamError::Transport(
                    "timed out between response body bytes".into(),
                ))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.incoming.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.incoming.size_hint()
    }
}
