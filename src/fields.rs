use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::BuildError;

/// An ordered multimap of header names and values.
///
/// Unlike [`http::HeaderMap`], which groups values under their name, a
/// `Fields` keeps the literal insertion order of every pair so that
/// `entries` returns exactly what was put in. Names and values are byte
/// strings; the only construction-time rule is that a name must not be
/// empty. Wire-level validity is checked when the collection is attached to
/// a request or response.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Bytes)>,
}

impl Fields {
    /// Build a collection from `(name, value)` pairs, preserving order.
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Result<Self, BuildError>
    where
        N: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let mut entries = Vec::new();
        for (name, value) in pairs {
            let name = name.as_ref();
            if name.is_empty() {
                return Err(BuildError::InvalidHeaderName(String::new()));
            }
            entries.push((name.to_string(), Bytes::copy_from_slice(value.as_ref())));
        }
        Ok(Self { entries })
    }

    /// Collect headers arriving off the wire. Order is as the peer sent
    /// them, grouped per name the way [`http::HeaderMap`] iterates.
    pub(crate) fn from_header_map(map: &HeaderMap) -> Self {
        let mut entries = Vec::with_capacity(map.len());
        for (name, value) in map.iter() {
            entries.push((
                name.as_str().to_string(),
                Bytes::copy_from_slice(value.as_bytes()),
            ));
        }
        Self { entries }
    }

    /// Convert to an [`http::HeaderMap`] for the transport, appending in
    /// insertion order. Fails if a name or value is not valid on the wire.
    pub(crate) fn to_header_map(&self) -> Result<HeaderMap, BuildError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let header_name = HeaderName::try_from(name.as_str())
                .map_err(|_| BuildError::InvalidHeaderName(name.clone()))?;
            let header_value = HeaderValue::from_bytes(value)
                .map_err(|_| BuildError::InvalidHeaderValue(name.clone()))?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }

    /// A restartable iterator over the pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order_and_bytes() {
        let fields = Fields::from_pairs([
            ("User-agent", "WASI-HTTP/0.0.1"),
            ("Content-type", "application/json"),
            ("User-agent", "second"),
        ])
        .unwrap();
        let entries: Vec<_> = fields.entries().collect();
        assert_eq!(
            entries,
            vec![
                ("User-agent", b"WASI-HTTP/0.0.1".as_slice()),
                ("Content-type", b"application/json".as_slice()),
                ("User-agent", b"second".as_slice()),
            ]
        );
        // Restartable: a second pass sees the same sequence.
        assert_eq!(fields.entries().count(), 3);
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Fields::from_pairs([("", "value")]).unwrap_err();
        assert_eq!(err, BuildError::InvalidHeaderName(String::new()));
    }

    #[test]
    fn wire_conversion_appends_duplicates() {
        let fields = Fields::from_pairs([("set-cookie", "a"), ("set-cookie", "b")]).unwrap();
        let map = fields.to_header_map().unwrap();
        let values: Vec<_> = map.get_all("set-cookie").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn invalid_wire_name_is_reported_on_conversion() {
        let fields = Fields::from_pairs([("bad name", "value")]).unwrap();
        assert_eq!(
            fields.to_header_map().unwrap_err(),
            BuildError::InvalidHeaderName("bad name".into())
        );
    }
}
