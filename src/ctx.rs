use core::any::Any;
use core::future::{poll_fn, Future};
use core::mem;
use core::pin::Pin;

use bytes::Bytes;
use http::header::HOST;
use http::{HeaderValue, Uri};
use http_body_util::Full;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::body::{BodyReader, BodyWriter, WriterTarget};
use crate::future::{FutureResponse, FutureState};
use crate::response::{IncomingBodyState, OutparamResult};
use crate::table::{Handle, ResourceTable};
use crate::{
    AlreadyConsumedError, AlreadySetError, BuildError, Client, DefaultClient, ExchangeError,
    Fields, IncomingRequest, IncomingResponse, Method, OutgoingRequest, OutgoingResponse,
    RequestOptions, ResponseOutparam, Scheme, StreamError, UseAfterReleaseError,
};

/// State for one logical task's HTTP exchanges: the resource table holding
/// every live handle, plus the client requests are dispatched through.
///
/// A context is exclusively owned by one task; operations take `&mut self`
/// and nothing here is shared or locked. Concurrent exchanges each get their
/// own context.
pub struct HttpCtx<C: Client = DefaultClient> {
    table: ResourceTable,
    client: C,
}

impl HttpCtx<DefaultClient> {
    /// A context dispatching through the [`DefaultClient`].
    pub fn new() -> Self {
        Self::with_client(DefaultClient)
    }
}

impl Default for HttpCtx<DefaultClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Client> HttpCtx<C> {
    pub fn with_client(client: C) -> Self {
        Self {
            table: ResourceTable::new(),
            client,
        }
    }

    /// Number of live entries in the resource table. Useful for asserting
    /// that a code path released every handle it created.
    pub fn live_handles(&self) -> usize {
        self.table.len()
    }

    // ===== header collections =====

    /// Create a header collection from `(name, value)` pairs.
    pub fn new_fields<N, V>(
        &mut self,
        pairs: impl IntoIterator<Item = (N, V)>,
    ) -> Result<Handle<Fields>, BuildError>
    where
        N: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let fields = Fields::from_pairs(pairs)?;
        Ok(self.table.push(fields))
    }

    /// The `(name, value)` pairs of a collection, in insertion order.
    pub fn fields_entries(
        &self,
        fields: Handle<Fields>,
    ) -> Result<Vec<(String, Bytes)>, UseAfterReleaseError> {
        let fields = self.table.get(fields)?;
        Ok(fields
            .entries()
            .map(|(n, v)| (n.to_string(), Bytes::copy_from_slice(v)))
            .collect())
    }

    pub fn drop_fields(&mut self, fields: Handle<Fields>) -> Result<(), UseAfterReleaseError> {
        self.release(fields, "fields")
    }

    // ===== outgoing requests (client side) =====

    /// Build an outgoing request. Consumes the header collection handle;
    /// the headers are frozen into the request.
    pub fn new_outgoing_request(
        &mut self,
        method: Method,
        scheme: Scheme,
        authority: &str,
        path: &str,
        query: &str,
        headers: Handle<Fields>,
    ) -> Result<Handle<OutgoingRequest>, BuildError> {
        let fields = self
            .table
            .get(headers)
            .map_err(|err| BuildError::UnknownHandle(err.handle))?;
        let request = OutgoingRequest::new(&method, &scheme, authority, path, query, fields)?;
        let _ = self.table.delete(headers);
        Ok(self.table.push(request))
    }

    /// Open the request body for writing. At most once per request, and
    /// only before dispatch.
    pub fn outgoing_request_write(
        &mut self,
        request: Handle<OutgoingRequest>,
    ) -> Result<Handle<BodyWriter>, AlreadyConsumedError> {
        let req = self.table.get(request).map_err(|err| {
            warn!(%err, "body open on a released request handle");
            AlreadyConsumedError
        })?;
        if req.sent || req.writer.is_some() {
            return Err(AlreadyConsumedError);
        }
        let writer = self.table.push(BodyWriter {
            target: WriterTarget::Request(request),
        });
        if let Ok(req) = self.table.get_mut(request) {
            req.writer = Some(writer);
        }
        Ok(writer)
    }

    pub fn drop_outgoing_request(
        &mut self,
        request: Handle<OutgoingRequest>,
    ) -> Result<(), UseAfterReleaseError> {
        let req = self.table.delete(request).map_err(|err| {
            warn!(%err, "released a request handle twice");
            err
        })?;
        if let Some(writer) = req.writer {
            let _ = self.table.delete(writer);
        }
        Ok(())
    }

    // ===== dispatch =====

    /// Dispatch a built request. The request's contents are consumed; the
    /// handle remains live (and must still be released) but cannot be sent
    /// or written again. Must be called within a tokio runtime.
    pub fn send(
        &mut self,
        request: Handle<OutgoingRequest>,
        options: Option<RequestOptions>,
    ) -> Result<Handle<FutureResponse>, ExchangeError> {
        let req = self.table.get_mut(request).map_err(|err| {
            warn!(%err, "send on a released request handle");
            ExchangeError::InvalidRequest(Some("unknown request handle".into()))
        })?;
        if req.sent {
            return Err(ExchangeError::InvalidRequest(Some(
                "request was already dispatched".into(),
            )));
        }
        if !self.client.is_supported_scheme(&req.scheme) {
            return Err(ExchangeError::ProtocolError(Some(format!(
                "unsupported scheme: {}",
                req.scheme
            ))));
        }
        req.sent = true;
        let method = req.method.clone();
        let scheme = req.scheme.clone();
        let authority = req.authority.clone();
        let path_with_query = req.path_with_query.clone();
        let mut headers = mem::take(&mut req.headers);
        let body = mem::take(&mut req.body).freeze();

        let uri = Uri::builder()
            .scheme(scheme)
            .authority(authority.clone())
            .path_and_query(path_with_query)
            .build()
            .map_err(|err| {
                debug!(?err, "failed to build request URI");
                ExchangeError::InvalidRequest(Some("invalid request URI".into()))
            })?;
        if self.client.set_host_header() && !headers.contains_key(HOST) {
            let host = HeaderValue::try_from(authority.as_str())
                .map_err(|err| ExchangeError::InvalidRequest(Some(err.to_string())))?;
            headers.insert(HOST, host);
        }
        let mut wire = http::Request::new(Full::new(body));
        *wire.method_mut() = method;
        *wire.uri_mut() = uri;
        *wire.headers_mut() = headers;

        let client = self.client.clone();
        let options = options.unwrap_or_default();
        let (tx, rx) = oneshot::channel();
        let task = tokio::task::spawn(async move {
            let result = client
                .send_request(wire, options)
                .await
                .map(IncomingResponse::from_http);
            if tx.send(result).is_err() {
                debug!("response future released before resolution");
            }
        });
        Ok(self.table.push(FutureResponse::pending(rx, task)))
    }

    /// Suspend until the exchange resolves. Resolution happens exactly
    /// once; awaiting a resolved future returns the cached result.
    pub async fn await_response(
        &mut self,
        future: Handle<FutureResponse>,
    ) -> Result<Handle<IncomingResponse>, ExchangeError> {
        let received = {
            let entry = self.table.get_mut(future).map_err(|err| {
                warn!(%err, "await on a released future handle");
                ExchangeError::InvalidRequest(Some("unknown future handle".into()))
            })?;
            match &mut entry.state {
                FutureState::Resolved(cached) => return cached.clone(),
                FutureState::Pending { rx, .. } => poll_fn(|cx| Pin::new(&mut *rx).poll(cx)).await,
            }
        };
        let resolved = match received {
            Ok(Ok(response)) => Ok(self.table.push(response)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ExchangeError::ProtocolError(Some(
                "exchange task terminated before resolving".into(),
            ))),
        };
        if let Ok(entry) = self.table.get_mut(future) {
            entry.state = FutureState::Resolved(resolved.clone());
        }
        resolved
    }

    /// Release an exchange future. If the exchange is still in flight this
    /// cancels it.
    pub fn drop_future_response(
        &mut self,
        future: Handle<FutureResponse>,
    ) -> Result<(), UseAfterReleaseError> {
        self.release(future, "future")
    }

    // ===== incoming responses (client side) =====

    pub fn response_status(
        &self,
        response: Handle<IncomingResponse>,
    ) -> Result<u16, UseAfterReleaseError> {
        Ok(self.table.get(response)?.status.as_u16())
    }

    /// The response headers as a header collection handle. The handle is
    /// created lazily and cached; it is released with the response.
    pub fn response_headers(
        &mut self,
        response: Handle<IncomingResponse>,
    ) -> Result<Handle<Fields>, UseAfterReleaseError> {
        let entry = self.table.get(response)?;
        if let Some(handle) = entry.headers_handle {
            return Ok(handle);
        }
        let fields = entry.headers.clone();
        let handle = self.table.push(fields);
        if let Ok(entry) = self.table.get_mut(response) {
            entry.headers_handle = Some(handle);
        }
        Ok(handle)
    }

    /// Take the response body for reading. Callable exactly once.
    pub fn response_consume(
        &mut self,
        response: Handle<IncomingResponse>,
    ) -> Result<Handle<BodyReader>, AlreadyConsumedError> {
        let stream = {
            let entry = self.table.get_mut(response).map_err(|err| {
                warn!(%err, "consume on a released response handle");
                AlreadyConsumedError
            })?;
            match mem::replace(&mut entry.body, IncomingBodyState::Consumed) {
                IncomingBodyState::Ready(stream) => stream,
                IncomingBodyState::Consumed => return Err(AlreadyConsumedError),
            }
        };
        let reader = self.table.push(BodyReader::new(stream));
        if let Ok(entry) = self.table.get_mut(response) {
            entry.reader = Some(reader);
        }
        Ok(reader)
    }

    pub fn drop_incoming_response(
        &mut self,
        response: Handle<IncomingResponse>,
    ) -> Result<(), UseAfterReleaseError> {
        let res = self.table.delete(response).map_err(|err| {
            warn!(%err, "released a response handle twice");
            err
        })?;
        if let Some(reader) = res.reader {
            let _ = self.table.delete(reader);
        }
        if let Some(headers) = res.headers_handle {
            let _ = self.table.delete(headers);
        }
        Ok(())
    }

    // ===== body streams =====

    /// Read up to `max_bytes` from a body stream.
    ///
    /// A read that returns data always reports `end_of_stream = false`; end
    /// of stream is a separate empty read. Short reads are valid; keep
    /// reading until `end_of_stream` is true.
    pub async fn stream_read(
        &mut self,
        reader: Handle<BodyReader>,
        max_bytes: u64,
    ) -> Result<(Bytes, bool), StreamError> {
        let entry = self.table.get_mut(reader).map_err(|err| {
            warn!(%err, "read on a released stream handle");
            StreamError::Closed
        })?;
        let max_bytes = usize::try_from(max_bytes).unwrap_or(usize::MAX);
        entry.read(max_bytes).await
    }

    /// Write body bytes through a writer handle. Writes to a request buffer
    /// until dispatch; writes to a response stream to the peer.
    pub async fn stream_write(
        &mut self,
        writer: Handle<BodyWriter>,
        bytes: &[u8],
    ) -> Result<u64, StreamError> {
        enum Target {
            Request(Handle<OutgoingRequest>),
            Channel(mpsc::Sender<Bytes>),
        }
        if bytes.is_empty() {
            return Ok(0);
        }
        let target = {
            let entry = self.table.get(writer).map_err(|err| {
                warn!(%err, "write on a released stream handle");
                StreamError::Closed
            })?;
            match &entry.target {
                WriterTarget::Request(request) => Target::Request(*request),
                WriterTarget::Response(tx) => Target::Channel(tx.clone()),
            }
        };
        match target {
            Target::Request(request) => {
                let Ok(req) = self.table.get_mut(request) else {
                    return Err(StreamError::Closed);
                };
                if req.sent {
                    return Err(StreamError::Closed);
                }
                req.body.extend_from_slice(bytes);
                Ok(bytes.len() as u64)
            }
            Target::Channel(tx) => {
                tx.send(Bytes::copy_from_slice(bytes))
                    .await
                    .map_err(|_| StreamError::Closed)?;
                Ok(bytes.len() as u64)
            }
        }
    }

    pub fn drop_input_stream(
        &mut self,
        reader: Handle<BodyReader>,
    ) -> Result<(), UseAfterReleaseError> {
        self.release(reader, "input stream")
    }

    pub fn drop_output_stream(
        &mut self,
        writer: Handle<BodyWriter>,
    ) -> Result<(), UseAfterReleaseError> {
        self.release(writer, "output stream")
    }

    // ===== incoming requests (server side) =====

    pub fn new_incoming_request(
        &mut self,
        scheme: Scheme,
        parts: &http::request::Parts,
    ) -> Handle<IncomingRequest> {
        self.table.push(IncomingRequest::from_parts(scheme, parts))
    }

    pub fn incoming_request_method(
        &self,
        request: Handle<IncomingRequest>,
    ) -> Result<Method, UseAfterReleaseError> {
        Ok(Method::from(&self.table.get(request)?.method))
    }

    pub fn incoming_request_scheme(
        &self,
        request: Handle<IncomingRequest>,
    ) -> Result<Scheme, UseAfterReleaseError> {
        Ok(self.table.get(request)?.scheme.clone())
    }

    pub fn incoming_request_authority(
        &self,
        request: Handle<IncomingRequest>,
    ) -> Result<Option<String>, UseAfterReleaseError> {
        Ok(self.table.get(request)?.authority.clone())
    }

    pub fn incoming_request_path_with_query(
        &self,
        request: Handle<IncomingRequest>,
    ) -> Result<Option<String>, UseAfterReleaseError> {
        Ok(self.table.get(request)?.path_with_query.clone())
    }

    /// The inbound request headers as a header collection handle, lazily
    /// created and cached like [`HttpCtx::response_headers`].
    pub fn incoming_request_headers(
        &mut self,
        request: Handle<IncomingRequest>,
    ) -> Result<Handle<Fields>, UseAfterReleaseError> {
        let entry = self.table.get(request)?;
        if let Some(handle) = entry.headers_handle {
            return Ok(handle);
        }
        let fields = entry.headers.clone();
        let handle = self.table.push(fields);
        if let Ok(entry) = self.table.get_mut(request) {
            entry.headers_handle = Some(handle);
        }
        Ok(handle)
    }

    pub fn drop_incoming_request(
        &mut self,
        request: Handle<IncomingRequest>,
    ) -> Result<(), UseAfterReleaseError> {
        let req = self.table.delete(request).map_err(|err| {
            warn!(%err, "released a request handle twice");
            err
        })?;
        if let Some(headers) = req.headers_handle {
            let _ = self.table.delete(headers);
        }
        Ok(())
    }

    // ===== outgoing responses (server side) =====

    /// Build a response to an inbound request. Consumes the header
    /// collection handle; the status must be in `100..=599`.
    pub fn new_outgoing_response(
        &mut self,
        status: u16,
        headers: Handle<Fields>,
    ) -> Result<Handle<OutgoingResponse>, BuildError> {
        let fields = self
            .table
            .get(headers)
            .map_err(|err| BuildError::UnknownHandle(err.handle))?;
        let response = OutgoingResponse::new(status, fields)?;
        let _ = self.table.delete(headers);
        Ok(self.table.push(response))
    }

    /// Open the response body for writing. At most once per response.
    /// Writing is valid before or after the outparam is set; once the peer
    /// stops reading, the next write fails with a stream error.
    pub fn outgoing_response_write(
        &mut self,
        response: Handle<OutgoingResponse>,
    ) -> Result<Handle<BodyWriter>, AlreadyConsumedError> {
        let res = self.table.get(response).map_err(|err| {
            warn!(%err, "body open on a released response handle");
            AlreadyConsumedError
        })?;
        if res.writer.is_some() {
            return Err(AlreadyConsumedError);
        }
        let tx = res.body_tx.clone();
        let writer = self.table.push(BodyWriter {
            target: WriterTarget::Response(tx),
        });
        if let Ok(res) = self.table.get_mut(response) {
            res.writer = Some(writer);
        }
        Ok(writer)
    }

    pub fn drop_outgoing_response(
        &mut self,
        response: Handle<OutgoingResponse>,
    ) -> Result<(), UseAfterReleaseError> {
        let res = self.table.delete(response).map_err(|err| {
            warn!(%err, "released a response handle twice");
            err
        })?;
        if let Some(writer) = res.writer {
            let _ = self.table.delete(writer);
        }
        Ok(())
    }

    // ===== response outparams (server side) =====

    pub fn new_response_outparam(
        &mut self,
        sender: oneshot::Sender<OutparamResult>,
    ) -> Handle<ResponseOutparam> {
        self.table.push(ResponseOutparam::new(sender))
    }

    /// Bind a response (or a terminal error) to the inbound request this
    /// outparam belongs to. Exactly once: the second call returns
    /// [`AlreadySetError`] and leaves the first result untouched.
    pub fn set_response_outparam(
        &mut self,
        outparam: Handle<ResponseOutparam>,
        result: Result<Handle<OutgoingResponse>, ExchangeError>,
    ) -> Result<(), AlreadySetError> {
        match self.table.get(outparam) {
            Ok(slot) if slot.sender.is_some() => {}
            Ok(_) => return Err(AlreadySetError),
            Err(err) => {
                warn!(%err, "set on a released outparam handle");
                return Err(AlreadySetError);
            }
        }
        let payload = match result {
            Ok(response) => {
                let Ok(res) = self.table.get_mut(response) else {
                    warn!("outparam set with a released response handle");
                    return Err(AlreadySetError);
                };
                let Some(http) = res.take_http() else {
                    // The response is already bound to another outparam.
                    return Err(AlreadySetError);
                };
                Ok(http)
            }
            Err(err) => Err(err),
        };
        let Ok(slot) = self.table.get_mut(outparam) else {
            return Err(AlreadySetError);
        };
        let Some(sender) = slot.sender.take() else {
            return Err(AlreadySetError);
        };
        if sender.send(payload).is_err() {
            // The peer stopped waiting; the slot still counts as set.
            warn!("response outparam receiver was dropped before set");
        }
        Ok(())
    }

    pub fn drop_response_outparam(
        &mut self,
        outparam: Handle<ResponseOutparam>,
    ) -> Result<(), UseAfterReleaseError> {
        self.release(outparam, "outparam")
    }

    fn release<T: Any + Send>(
        &mut self,
        handle: Handle<T>,
        kind: &str,
    ) -> Result<(), UseAfterReleaseError> {
        match self.table.delete(handle) {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(%err, kind, "handle released twice");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> HttpCtx {
        HttpCtx::new()
    }

    #[test]
    fn build_consumes_the_fields_handle() {
        let mut ctx = ctx();
        let fields = ctx.new_fields([("user-agent", "WASI-HTTP/0.0.1")]).unwrap();
        let request = ctx
            .new_outgoing_request(Method::Get, Scheme::Http, "example.test", "/get", "", fields)
            .unwrap();
        assert!(ctx.fields_entries(fields).is_err());
        ctx.drop_outgoing_request(request).unwrap();
        assert_eq!(ctx.live_handles(), 0);
    }

    #[test]
    fn build_then_release_without_send_leaves_no_handles() {
        let mut ctx = ctx();
        let fields = ctx.new_fields([("content-type", "application/json")]).unwrap();
        let request = ctx
            .new_outgoing_request(Method::Post, Scheme::Http, "example.test", "/post", "", fields)
            .unwrap();
        let writer = ctx.outgoing_request_write(request).unwrap();
        ctx.drop_outgoing_request(request).unwrap();
        // The writer was bound to the request and went with it.
        assert!(ctx.drop_output_stream(writer).is_err());
        assert_eq!(ctx.live_handles(), 0);
    }

    #[test]
    fn second_body_open_is_rejected() {
        let mut ctx = ctx();
        let fields = ctx.new_fields([("accept", "*/*")]).unwrap();
        let request = ctx
            .new_outgoing_request(Method::Post, Scheme::Http, "example.test", "/", "", fields)
            .unwrap();
        ctx.outgoing_request_write(request).unwrap();
        assert_eq!(
            ctx.outgoing_request_write(request).unwrap_err(),
            AlreadyConsumedError
        );
    }

    #[test]
    fn double_release_is_reported() {
        let mut ctx = ctx();
        let fields = ctx.new_fields([("server", "WASI-HTTP/0.0.1")]).unwrap();
        ctx.drop_fields(fields).unwrap();
        let err = ctx.drop_fields(fields).unwrap_err();
        assert_eq!(err.handle, fields.id());
    }

    #[tokio::test]
    async fn request_writes_buffer_until_send() {
        let mut ctx = ctx();
        let fields = ctx.new_fields([("content-type", "application/json")]).unwrap();
        let request = ctx
            .new_outgoing_request(Method::Post, Scheme::Http, "example.test", "/post", "", fields)
            .unwrap();
        let writer = ctx.outgoing_request_write(request).unwrap();
        assert_eq!(ctx.stream_write(writer, b"{\"foo\": ").await.unwrap(), 8);
        assert_eq!(ctx.stream_write(writer, b"\"bar\"}").await.unwrap(), 6);
        assert_eq!(&ctx.table.get(request).unwrap().body[..], b"{\"foo\": \"bar\"}");
    }
}
