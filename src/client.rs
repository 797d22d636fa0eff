use core::future::Future;
use core::time::Duration;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http::uri::PathAndQuery;
use http::Uri;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt as _, Full};
use hyper::client::conn::http1;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::body::TimedBody;
use crate::io::TokioIo;
use crate::{ExchangeError, RequestOptions, StreamError};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_BETWEEN_BYTES_TIMEOUT: Duration = Duration::from_secs(600);

/// The transport an exchange is dispatched through.
///
/// The request carries an absolute URI; the client owns everything from
/// there down: connection establishment, the wire protocol, and the
/// caller-supplied timeouts. Implementations other than [`DefaultClient`]
/// are primarily useful to embed a fake transport in tests.
pub trait Client: Clone + Send + Sync + 'static {
    /// Perform one request/response exchange.
    fn send_request(
        &self,
        request: http::Request<Full<Bytes>>,
        options: RequestOptions,
    ) -> impl Future<Output = Result<http::Response<BoxBody<Bytes, StreamError>>, ExchangeError>> + Send;

    /// Whether requests with this scheme can be dispatched at all.
    fn is_supported_scheme(&self, scheme: &http::uri::Scheme) -> bool {
        *scheme == http::uri::Scheme::HTTP || *scheme == http::uri::Scheme::HTTPS
    }

    /// Whether the dispatcher should fill in a `Host` header from the
    /// request authority before handing the request over.
    fn set_host_header(&self) -> bool {
        true
    }
}

/// HTTP/1.1 client over a fresh TCP (or TLS, for `https`) connection per
/// exchange.
#[derive(Clone, Debug, Default)]
pub struct DefaultClient;

impl Client for DefaultClient {
    async fn send_request(
        &self,
        request: http::Request<Full<Bytes>>,
        options: RequestOptions,
    ) -> Result<http::Response<BoxBody<Bytes, StreamError>>, ExchangeError> {
        let connect_timeout = options.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let first_byte_timeout = options
            .first_byte_timeout
            .unwrap_or(DEFAULT_FIRST_BYTE_TIMEOUT);
        let between_bytes_timeout = options
            .between_bytes_timeout
            .unwrap_or(DEFAULT_BETWEEN_BYTES_TIMEOUT);

        let (parts, body) = request.into_parts();
        let use_tls = parts.uri.scheme() == Some(&http::uri::Scheme::HTTPS);
        let authority = parts
            .uri
            .authority()
            .ok_or_else(|| {
                ExchangeError::InvalidRequest(Some("request URI has no authority".into()))
            })?
            .clone();
        let host = authority.host().to_string();
        let port = authority.port_u16().unwrap_or(if use_tls { 443 } else { 80 });

        let mut sender = timeout(connect_timeout, async {
            let tcp = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(connect_error)?;
            if use_tls {
                let tls = tls_connect(&host, tcp).await?;
                start_connection(TokioIo::new(tls)).await
            } else {
                start_connection(TokioIo::new(tcp)).await
            }
        })
        .await
        .map_err(|_| ExchangeError::Timeout)??;

        // HTTP/1.1 wants the origin-form request target; the authority
        // already travels in the `Host` header.
        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        let uri = Uri::builder()
            .path_and_query(path_and_query)
            .build()
            .map_err(|err| ExchangeError::InvalidRequest(Some(err.to_string())))?;
        let mut request = http::Request::new(body);
        *request.method_mut() = parts.method;
        *request.uri_mut() = uri;
        *request.headers_mut() = parts.headers;

        let response = timeout(first_byte_timeout, sender.send_request(request))
            .await
            .map_err(|_| ExchangeError::Timeout)?
            .map_err(hyper_error)?;
        let (parts, incoming) = response.into_parts();
        let body = TimedBody::new(incoming, between_bytes_timeout).boxed();
        Ok(http::Response::from_parts(parts, body))
    }
}

async fn start_connection<T>(io: T) -> Result<http1::SendRequest<Full<Bytes>>, ExchangeError>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(io).await.map_err(hyper_error)?;
    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            debug!(?err, "http connection terminated");
        }
    });
    Ok(sender)
}

async fn tls_connect(
    host: &str,
    tcp: TcpStream,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, ExchangeError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
    let domain = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| ExchangeError::InvalidRequest(Some(format!("invalid TLS name: {host:?}"))))?;
    connector
        .connect(domain, tcp)
        .await
        .map_err(|err| ExchangeError::ProtocolError(Some(err.to_string())))
}

fn connect_error(err: io::Error) -> ExchangeError {
    debug!(?err, "failed to connect");
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ExchangeError::ConnectionRefused,
        io::ErrorKind::TimedOut => ExchangeError::Timeout,
        _ => ExchangeError::ProtocolError(Some(err.to_string())),
    }
}

fn hyper_error(err: hyper::Error) -> ExchangeError {
    debug!(?err, "exchange failed");
    ExchangeError::ProtocolError(Some(err.to_string()))
}
