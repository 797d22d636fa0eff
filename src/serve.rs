use core::convert::Infallible;
use core::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::body::ChannelBody;
use crate::io::TokioIo;
use crate::table::Handle;
use crate::{HttpCtx, IncomingRequest, ResponseOutparam, Scheme};

/// A server-side request handler.
///
/// For each inbound request the handler receives a fresh [`HttpCtx`], a
/// handle to the request, and a write-once response outparam it must fill
/// exactly once. State that should survive across invocations (counters,
/// caches) lives on the handler value itself, which is shared for the
/// lifetime of the server.
pub trait Handler: Send + Sync + 'static {
    fn handle(
        &self,
        ctx: &mut HttpCtx,
        request: Handle<IncomingRequest>,
        outparam: Handle<ResponseOutparam>,
    ) -> impl Future<Output = ()> + Send;
}

/// Accept connections on `listener` and serve each over HTTP/1.1, routing
/// every request through `handler`.
pub async fn serve<H: Handler>(listener: TcpListener, handler: Arc<H>) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener
            .accept()
            .await
            .context("failed to accept connection")?;
        debug!(%addr, "serving new client");
        let handler = handler.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(
                    TokioIo::new(stream),
                    service_fn(move |req| {
                        let handler = handler.clone();
                        async move { Ok::<_, Infallible>(handle_request(handler, req).await) }
                    }),
                )
                .await
            {
                warn!(?err, %addr, "error serving client");
            }
        });
    }
}

/// Run one inbound request through the handler: a fresh context, a request
/// handle and an outparam handle go in; whatever the handler binds to the
/// outparam comes out. The handler runs as its own task so it may keep
/// streaming the response body after the head has been returned to the
/// connection.
async fn handle_request<H: Handler>(
    handler: Arc<H>,
    request: hyper::Request<hyper::body::Incoming>,
) -> http::Response<ChannelBody> {
    let (parts, _body) = request.into_parts();
    let (tx, rx) = oneshot::channel();
    let mut ctx = HttpCtx::new();
    let request = ctx.new_incoming_request(Scheme::Http, &parts);
    let outparam = ctx.new_response_outparam(tx);
    tokio::task::spawn(async move {
        handler.handle(&mut ctx, request, outparam).await;
    });
    match rx.await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            error!(%err, "handler reported an exchange error");
            error_response()
        }
        Err(_) => {
            // The handler returned (or died) without ever binding a
            // response. Report it and answer for it; this must not take the
            // server down.
            error!("handler finished without setting the response outparam");
            error_response()
        }
    }
}

fn error_response() -> http::Response<ChannelBody> {
    let mut response = http::Response::new(ChannelBody::closed());
    *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
    response
}
