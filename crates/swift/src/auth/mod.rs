//! Authentication against the identity service
//!
//! Three protocol generations share one capability set: build the identity
//! request, digest the reply, then answer queries for the storage URL, CDN
//! URL, token and expiry. The connection owns the HTTP exchange itself, so
//! authenticators stay pure request-builders/response-parsers and can be
//! exercised without a network.

mod v1;
mod v2;
mod v3;

pub(crate) use v1::V1Auth;
pub(crate) use v2::V2Auth;
pub(crate) use v3::V3Auth;

use chrono::{DateTime, Utc};
use reqwest::Method;

use sc_core::{Error, Headers, Result};

use crate::connection::Connection;

/// Which identity protocol to speak
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthVersion {
    /// Infer the version from the auth URL path
    #[default]
    Detect,
    /// Legacy v1.0 header exchange
    V1,
    /// Keystone v2.0 / Rackspace
    V2,
    /// Keystone v3
    V3,
}

/// Which URL to pick from the service catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointType {
    /// The internet-facing endpoint
    #[default]
    Public,
    /// The service-net endpoint
    Internal,
    /// The admin endpoint
    Admin,
}

impl EndpointType {
    /// The catalog `interface` value for this endpoint type
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointType::Public => "public",
            EndpointType::Internal => "internal",
            EndpointType::Admin => "admin",
        }
    }
}

/// A fully described identity request, ready for the pipeline to send
#[derive(Debug)]
pub struct AuthRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// The operations needed to authenticate with the store
///
/// This encapsulates the different identity schemes in use. After a
/// successful [`Authenticator::response`] the query methods return non-empty
/// values.
pub trait Authenticator: Send + Sync + std::fmt::Debug {
    /// Build the identity request from the connection's credentials
    fn request(&mut self, conn: &Connection) -> Result<AuthRequest>;

    /// Digest the identity response
    fn response(&mut self, headers: &Headers, body: &[u8]) -> Result<()>;

    /// The storage URL for the requested endpoint type, `""` if absent
    fn storage_url(&self, endpoint_type: EndpointType) -> String;

    /// The auth token, `""` if absent
    fn token(&self) -> String;

    /// The CDN management URL if the scheme provides one
    fn cdn_url(&self) -> String;

    /// When the token stops working, if the scheme reports it
    fn expires(&self) -> Option<DateTime<Utc>>;
}

/// Create an authenticator for the connection, inferring the protocol
/// version from the auth URL when it was not set explicitly.
pub(crate) fn new_authenticator(conn: &Connection) -> Result<Box<dyn Authenticator>> {
    let version = match conn.auth_version() {
        AuthVersion::Detect => {
            let url = conn.auth_url();
            if url.contains("v3") {
                AuthVersion::V3
            } else if url.contains("v2") {
                AuthVersion::V2
            } else if url.contains("v1") {
                AuthVersion::V1
            } else {
                return Err(Error::Auth(
                    "can't find auth version in auth URL - set it explicitly".to_string(),
                ));
            }
        }
        explicit => explicit,
    };
    Ok(match version {
        AuthVersion::V1 => Box::new(V1Auth::new()),
        // Guess whether this is an API key or a password; the guess is
        // toggled on failure until one of them works.
        AuthVersion::V2 => Box::new(V2Auth::new(conn.api_key().len() >= 32)),
        AuthVersion::V3 => Box::new(V3Auth::new()),
        AuthVersion::Detect => unreachable!(),
    })
}

/// Parse an RFC 3339 expiry stamp, ignoring an empty or damaged value
pub(crate) fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
