//! Header and metadata model
//!
//! Swift speaks through headers as much as through bodies: metadata, manifest
//! markers, integrity hashes and range arithmetic all ride on them. Keys are
//! canonicalized (`x-object-meta-x` → `X-Object-Meta-X`) so lookups behave the
//! same whether a map was built by the caller or parsed off the wire, where
//! HTTP/2-era clients lower-case everything.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Metadata prefix on account headers
pub const ACCOUNT_META_PREFIX: &str = "X-Account-Meta-";
/// Metadata prefix on container headers
pub const CONTAINER_META_PREFIX: &str = "X-Container-Meta-";
/// Metadata prefix on object headers
pub const OBJECT_META_PREFIX: &str = "X-Object-Meta-";

/// Marker header naming the segment prefix of a dynamic large object
pub const MANIFEST_HEADER: &str = "X-Object-Manifest";
/// Marker header present on static large object manifests
pub const SLO_HEADER: &str = "X-Static-Large-Object";

/// Canonicalize a header name: first letter of each `-`-separated token
/// upper-cased, the rest lower-cased.
fn canonical(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('-').enumerate() {
        if i > 0 {
            out.push('-');
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(|c| c.to_lowercase()));
        }
    }
    out
}

/// An ordered, case-insensitive map of HTTP headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Create an empty header map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(canonical(name.as_ref()), value.into());
    }

    /// Look up a header value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&canonical(name)).map(String::as_str)
    }

    /// Remove a header, returning its value if present
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&canonical(name))
    }

    /// Whether the header is present
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&canonical(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge another header map into this one
    pub fn extend(&mut self, other: &Headers) {
        for (k, v) in other.iter() {
            self.0.insert(k.to_string(), v.to_string());
        }
    }

    /// Parse a header as a decimal i64
    pub fn get_i64(&self, name: &str) -> Result<i64> {
        let value = self
            .get(name)
            .ok_or_else(|| Error::bad_header(name, "missing"))?;
        value
            .trim()
            .parse()
            .map_err(|e| Error::bad_header(name, format!("{value:?}: {e}")))
    }

    /// True if the headers mark either flavor of large object manifest
    pub fn is_large_object(&self) -> bool {
        self.is_large_object_dlo() || self.is_large_object_slo()
    }

    /// True if the headers mark a dynamic large object manifest
    pub fn is_large_object_dlo(&self) -> bool {
        self.contains(MANIFEST_HEADER)
    }

    /// True if the headers mark a static large object manifest
    pub fn is_large_object_slo(&self) -> bool {
        self.contains(SLO_HEADER)
    }

    /// Metadata view of `X-Object-Meta-*` headers
    pub fn object_metadata(&self) -> Metadata {
        self.metadata(OBJECT_META_PREFIX)
    }

    /// Metadata view of `X-Container-Meta-*` headers
    pub fn container_metadata(&self) -> Metadata {
        self.metadata(CONTAINER_META_PREFIX)
    }

    /// Metadata view of `X-Account-Meta-*` headers
    pub fn account_metadata(&self) -> Metadata {
        self.metadata(ACCOUNT_META_PREFIX)
    }

    fn metadata(&self, prefix: &str) -> Metadata {
        let mut m = Metadata::new();
        for (name, value) in self.iter() {
            if let Some(key) = strip_prefix_ignore_case(name, prefix) {
                m.insert(key.to_lowercase(), value.to_string());
            }
        }
        m
    }
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    if name.len() >= prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&name[prefix.len()..])
    } else {
        None
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.insert(k, v);
        }
        h
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Headers {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// Prefix-stripped, lower-cased metadata keys and their values
///
/// Convert back to wire form with [`Metadata::object_headers`] and friends.
/// A POST of the produced headers replaces the full metadata set, so a key
/// omitted here is a key deleted on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into().to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Headers carrying this metadata with the object prefix
    pub fn object_headers(&self) -> Headers {
        self.headers(OBJECT_META_PREFIX)
    }

    /// Headers carrying this metadata with the container prefix
    pub fn container_headers(&self) -> Headers {
        self.headers(CONTAINER_META_PREFIX)
    }

    /// Headers carrying this metadata with the account prefix
    pub fn account_headers(&self) -> Headers {
        self.headers(ACCOUNT_META_PREFIX)
    }

    fn headers(&self, prefix: &str) -> Headers {
        let mut h = Headers::new();
        for (key, value) in self.iter() {
            h.insert(format!("{prefix}{key}"), value.to_string());
        }
        h
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut m = Metadata::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}
