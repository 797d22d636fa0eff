use bytes::BytesMut;
use http::header::HOST;
use http::uri::{Authority, PathAndQuery};
use http::HeaderMap;

use crate::body::BodyWriter;
use crate::table::Handle;
use crate::{BuildError, Fields, Method, Scheme};

/// The resource behind an outgoing request handle.
///
/// Built by [`HttpCtx::new_outgoing_request`](crate::HttpCtx::new_outgoing_request),
/// dispatched at most once, released exactly once.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub(crate) method: http::Method,
    pub(crate) scheme: http::uri::Scheme,
    pub(crate) authority: Authority,
    pub(crate) path_with_query: PathAndQuery,
    pub(crate) headers: HeaderMap,
    pub(crate) body: BytesMut,
    pub(crate) writer: Option<Handle<BodyWriter>>,
    pub(crate) sent: bool,
}

impl OutgoingRequest {
    pub(crate) fn new(
        method: &Method,
        scheme: &Scheme,
        authority: &str,
        path: &str,
        query: &str,
        headers: &Fields,
    ) -> Result<Self, BuildError> {
        let method = http::Method::try_from(method)?;
        let scheme = http::uri::Scheme::try_from(scheme)?;
        if authority.is_empty() {
            return Err(BuildError::EmptyAuthority);
        }
        let authority = Authority::try_from(authority)
            .map_err(|_| BuildError::InvalidAuthority(authority.to_string()))?;
        let path_with_query = if path.is_empty() && query.is_empty() {
            PathAndQuery::from_static("/")
        } else {
            let combined = format!("{path}{query}");
            PathAndQuery::try_from(combined.as_str())
                .map_err(|_| BuildError::InvalidPathWithQuery(combined))?
        };
        let headers = headers.to_header_map()?;
        Ok(Self {
            method,
            scheme,
            authority,
            path_with_query,
            headers,
            body: BytesMut::new(),
            writer: None,
            sent: false,
        })
    }
}

/// The resource behind an inbound request handle, as seen by a server
/// handler. Carries the request line and headers; the handler answers it
/// through the response outparam.
pub struct IncomingRequest {
    pub(crate) method: http::Method,
    pub(crate) scheme: Scheme,
    pub(crate) authority: Option<String>,
    pub(crate) path_with_query: Option<String>,
    pub(crate) headers: Fields,
    pub(crate) headers_handle: Option<Handle<Fields>>,
}

impl IncomingRequest {
    pub(crate) fn from_parts(scheme: Scheme, parts: &http::request::Parts) -> Self {
        let authority = parts
            .uri
            .authority()
            .map(|a| a.to_string())
            .or_else(|| {
                // HTTP/1.1 origin-form: the authority travels in `Host`.
                parts
                    .headers
                    .get(HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string())
            });
        Self {
            method: parts.method.clone(),
            scheme,
            authority,
            path_with_query: parts.uri.path_and_query().map(|pq| pq.to_string()),
            headers: Fields::from_header_map(&parts.headers),
            headers_handle: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Fields {
        Fields::from_pairs([("user-agent", "WASI-HTTP/0.0.1")]).unwrap()
    }

    #[test]
    fn builds_with_path_and_query() {
        let req = OutgoingRequest::new(
            &Method::Get,
            &Scheme::Http,
            "example.test",
            "/get",
            "?some=arg&goes=here",
            &fields(),
        )
        .unwrap();
        assert_eq!(req.path_with_query.as_str(), "/get?some=arg&goes=here");
        assert_eq!(req.authority.as_str(), "example.test");
    }

    #[test]
    fn empty_path_defaults_to_root() {
        let req = OutgoingRequest::new(
            &Method::Get,
            &Scheme::Http,
            "example.test",
            "",
            "",
            &fields(),
        )
        .unwrap();
        assert_eq!(req.path_with_query.as_str(), "/");
    }

    #[test]
    fn empty_authority_is_rejected() {
        let err = OutgoingRequest::new(&Method::Get, &Scheme::Http, "", "/", "", &fields())
            .unwrap_err();
        assert_eq!(err, BuildError::EmptyAuthority);
    }

    #[test]
    fn malformed_authority_is_rejected() {
        let err = OutgoingRequest::new(
            &Method::Get,
            &Scheme::Http,
            "exa mple.test",
            "/",
            "",
            &fields(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::InvalidAuthority("exa mple.test".to_string())
        );
    }
}
