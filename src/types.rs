use core::time::Duration;

use crate::BuildError;

/// HTTP request method.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    /// A method outside the closed set, carried verbatim.
    Other(String),
}

impl From<&http::Method> for Method {
    fn from(method: &http::Method) -> Self {
        if method == http::Method::GET {
            Self::Get
        } else if method == http::Method::HEAD {
            Self::Head
        } else if method == http::Method::POST {
            Self::Post
        } else if method == http::Method::PUT {
            Self::Put
        } else if method == http::Method::DELETE {
            Self::Delete
        } else if method == http::Method::CONNECT {
            Self::Connect
        } else if method == http::Method::OPTIONS {
            Self::Options
        } else if method == http::Method::TRACE {
            Self::Trace
        } else if method == http::Method::PATCH {
            Self::Patch
        } else {
            Self::Other(method.as_str().into())
        }
    }
}

impl TryFrom<&Method> for http::Method {
    type Error = BuildError;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        match method {
            Method::Get => Ok(Self::GET),
            Method::Head => Ok(Self::HEAD),
            Method::Post => Ok(Self::POST),
            Method::Put => Ok(Self::PUT),
            Method::Delete => Ok(Self::DELETE),
            Method::Connect => Ok(Self::CONNECT),
            Method::Options => Ok(Self::OPTIONS),
            Method::Trace => Ok(Self::TRACE),
            Method::Patch => Ok(Self::PATCH),
            Method::Other(s) => s.parse().map_err(|_| BuildError::InvalidMethod(s.clone())),
        }
    }
}

/// URI scheme of a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Scheme {
    Http,
    Https,
    /// A scheme outside the closed set, carried verbatim.
    Other(String),
}

impl From<&http::uri::Scheme> for Scheme {
    fn from(scheme: &http::uri::Scheme) -> Self {
        if *scheme == http::uri::Scheme::HTTP {
            Self::Http
        } else if *scheme == http::uri::Scheme::HTTPS {
            Self::Https
        } else {
            Self::Other(scheme.as_str().into())
        }
    }
}

impl TryFrom<&Scheme> for http::uri::Scheme {
    type Error = BuildError;

    fn try_from(scheme: &Scheme) -> Result<Self, Self::Error> {
        match scheme {
            Scheme::Http => Ok(Self::HTTP),
            Scheme::Https => Ok(Self::HTTPS),
            Scheme::Other(s) => s.parse().map_err(|_| BuildError::InvalidScheme(s.clone())),
        }
    }
}

/// Caller-supplied knobs for a single dispatch. Absent fields use the
/// client's defaults.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// How long to wait for a connection to be established.
    pub connect_timeout: Option<Duration>,
    /// How long to wait for the first byte of the response.
    pub first_byte_timeout: Option<Duration>,
    /// How long to wait between frames of the response body.
    pub between_bytes_timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trip() {
        for method in [
            Method::Get,
            Method::Head,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Connect,
            Method::Options,
            Method::Trace,
            Method::Patch,
            Method::Other("PROPFIND".into()),
        ] {
            let wire = http::Method::try_from(&method).unwrap();
            assert_eq!(Method::from(&wire), method);
        }
    }

    #[test]
    fn custom_method_is_validated() {
        let err = http::Method::try_from(&Method::Other("bad method".into())).unwrap_err();
        assert_eq!(err, BuildError::InvalidMethod("bad method".into()));
    }

    #[test]
    fn scheme_round_trip() {
        for scheme in [Scheme::Http, Scheme::Https, Scheme::Other("ws".into())] {
            let wire = http::uri::Scheme::try_from(&scheme).unwrap();
            assert_eq!(Scheme::from(&wire), scheme);
        }
    }
}
