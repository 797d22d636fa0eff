use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use tokio::net::TcpListener;
use tracing::debug;

use http_exchange::{
    serve, AlreadySetError, Handle, Handler, HttpCtx, IncomingRequest, Method, ResponseOutparam,
    Scheme,
};

/// The fixture handler: logs the request line and headers, then answers
/// 404 with a counted greeting. The counter is handler state, shared across
/// invocations for the lifetime of the server process.
struct CountingHandler {
    count: AtomicU64,
}

impl Handler for CountingHandler {
    async fn handle(
        &self,
        ctx: &mut HttpCtx,
        request: Handle<IncomingRequest>,
        outparam: Handle<ResponseOutparam>,
    ) {
        let method = ctx.incoming_request_method(request).unwrap();
        let authority = ctx.incoming_request_authority(request).unwrap();
        let path = ctx.incoming_request_path_with_query(request).unwrap();
        debug!(?method, ?authority, ?path, "inbound request");
        let headers = ctx.incoming_request_headers(request).unwrap();
        for (name, value) in ctx.fields_entries(headers).unwrap() {
            debug!(name = %name, value = %String::from_utf8_lossy(&value), "inbound header");
        }

        let fields = ctx
            .new_fields([
                ("Server", "WASI-HTTP/0.0.1"),
                ("Content-type", "text/plain"),
            ])
            .unwrap();
        let response = ctx.new_outgoing_response(404, fields).unwrap();
        ctx.set_response_outparam(outparam, Ok(response)).unwrap();

        let writer = ctx.outgoing_response_write(response).unwrap();
        let n = self.count.fetch_add(1, Ordering::SeqCst);
        let body = format!("Hello from WASM! ({n})");
        ctx.stream_write(writer, body.as_bytes()).await.unwrap();

        ctx.drop_output_stream(writer).unwrap();
        ctx.drop_outgoing_response(response).unwrap();
        ctx.drop_response_outparam(outparam).unwrap();
        ctx.drop_incoming_request(request).unwrap();
    }
}

/// Sets the outparam twice; the second set must fail without disturbing
/// the first.
struct DoubleSetHandler;

impl Handler for DoubleSetHandler {
    async fn handle(
        &self,
        ctx: &mut HttpCtx,
        _request: Handle<IncomingRequest>,
        outparam: Handle<ResponseOutparam>,
    ) {
        let first_fields = ctx.new_fields([("x-attempt", "first")]).unwrap();
        let first = ctx.new_outgoing_response(200, first_fields).unwrap();
        ctx.set_response_outparam(outparam, Ok(first)).unwrap();

        let second_fields = ctx.new_fields([("x-attempt", "second")]).unwrap();
        let second = ctx.new_outgoing_response(500, second_fields).unwrap();
        let verdict = match ctx.set_response_outparam(outparam, Ok(second)) {
            Err(AlreadySetError) => "second set rejected",
            Ok(()) => "second set accepted",
        };

        // Report the outcome through the body of the response that won.
        let writer = ctx.outgoing_response_write(first).unwrap();
        ctx.stream_write(writer, verdict.as_bytes()).await.unwrap();
    }
}

/// Never binds a response at all.
struct SilentHandler;

impl Handler for SilentHandler {
    async fn handle(
        &self,
        _ctx: &mut HttpCtx,
        _request: Handle<IncomingRequest>,
        _outparam: Handle<ResponseOutparam>,
    ) {
    }
}

async fn spawn_server<H: Handler>(handler: H) -> Result<SocketAddr> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    tokio::task::spawn(serve(listener, Arc::new(handler)));
    Ok(addr)
}

struct ClientResponse {
    status: u16,
    headers: Vec<(String, Bytes)>,
    body: Vec<u8>,
}

/// Drive one GET through the crate's own client side.
async fn fetch(addr: SocketAddr, path: &str) -> Result<ClientResponse> {
    let mut ctx = HttpCtx::new();
    let headers = ctx.new_fields([("User-agent", "WASI-HTTP/0.0.1")])?;
    let request =
        ctx.new_outgoing_request(Method::Get, Scheme::Http, &addr.to_string(), path, "", headers)?;
    let future = ctx.send(request, None)?;
    let response = ctx.await_response(future).await?;
    let status = ctx.response_status(response)?;
    let header_handle = ctx.response_headers(response)?;
    let headers = ctx.fields_entries(header_handle)?;
    let reader = ctx.response_consume(response)?;
    let mut body = Vec::new();
    loop {
        let (chunk, end_of_stream) = ctx.stream_read(reader, 64 * 1024).await?;
        body.extend_from_slice(&chunk);
        if end_of_stream {
            break;
        }
    }
    Ok(ClientResponse {
        status,
        headers,
        body,
    })
}

#[test_log::test(tokio::test)]
async fn counter_increments_across_invocations() -> Result<()> {
    let addr = spawn_server(CountingHandler {
        count: AtomicU64::new(0),
    })
    .await?;

    let first = fetch(addr, "/").await?;
    assert_eq!(first.status, 404);
    assert_eq!(first.body, b"Hello from WASM! (0)");

    let second = fetch(addr, "/").await?;
    assert_eq!(second.status, 404);
    assert_eq!(second.body, b"Hello from WASM! (1)");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn concurrent_exchanges_use_independent_contexts() -> Result<()> {
    let addr = spawn_server(CountingHandler {
        count: AtomicU64::new(0),
    })
    .await?;

    // One context per task; the handles never cross task boundaries.
    let (first, second) = futures::join!(fetch(addr, "/"), fetch(addr, "/"));
    let (first, second) = (first?, second?);
    assert_eq!(first.status, 404);
    assert_eq!(second.status, 404);
    let mut bodies = vec![first.body, second.body];
    bodies.sort();
    assert_eq!(bodies[0], b"Hello from WASM! (0)");
    assert_eq!(bodies[1], b"Hello from WASM! (1)");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn response_headers_arrive_in_build_order() -> Result<()> {
    let addr = spawn_server(CountingHandler {
        count: AtomicU64::new(0),
    })
    .await?;

    let response = fetch(addr, "/").await?;
    let ours: Vec<_> = response
        .headers
        .iter()
        .filter(|(name, _)| name == "server" || name == "content-type")
        .collect();
    assert_eq!(ours.len(), 2);
    assert_eq!(ours[0].0, "server");
    assert_eq!(ours[0].1, "WASI-HTTP/0.0.1");
    assert_eq!(ours[1].0, "content-type");
    assert_eq!(ours[1].1, "text/plain");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn second_outparam_set_does_not_disturb_the_first() -> Result<()> {
    let addr = spawn_server(DoubleSetHandler).await?;

    let response = fetch(addr, "/").await?;
    assert_eq!(response.status, 200);
    let attempt = response
        .headers
        .iter()
        .find(|(name, _)| name == "x-attempt")
        .map(|(_, value)| value.clone())
        .unwrap();
    assert_eq!(attempt, "first");
    assert_eq!(response.body, b"second set rejected");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn unset_outparam_is_reported_not_fatal() -> Result<()> {
    let addr = spawn_server(SilentHandler).await?;

    let response = fetch(addr, "/").await?;
    assert_eq!(response.status, 500);

    // The violation was reported for that request only; the server still
    // answers the next one.
    let again = fetch(addr, "/").await?;
    assert_eq!(again.status, 500);
    Ok(())
}
