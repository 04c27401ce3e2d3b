//! v1 authentication
//!
//! The oldest scheme: a GET with credential headers, the storage URL and
//! token handed back in response headers.

use chrono::{DateTime, Utc};
use reqwest::Method;
use url::Url;

use sc_core::{Headers, Result};

use super::{AuthRequest, Authenticator, EndpointType};
use crate::connection::Connection;

#[derive(Debug, Default)]
pub(crate) struct V1Auth {
    /// Response headers kept whole so extensions can read them
    headers: Headers,
}

impl V1Auth {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Authenticator for V1Auth {
    fn request(&mut self, conn: &Connection) -> Result<AuthRequest> {
        Ok(AuthRequest {
            method: Method::GET,
            url: conn.auth_url().to_string(),
            headers: vec![
                ("X-Auth-Key".to_string(), conn.api_key().to_string()),
                ("X-Auth-User".to_string(), conn.user_name().to_string()),
            ],
            body: None,
        })
    }

    fn response(&mut self, headers: &Headers, _body: &[u8]) -> Result<()> {
        self.headers = headers.clone();
        Ok(())
    }

    fn storage_url(&self, endpoint_type: EndpointType) -> String {
        let storage_url = self.headers.get("X-Storage-Url").unwrap_or_default();
        if endpoint_type == EndpointType::Internal {
            // Service net convention: prefix the host with snet-
            if let Ok(mut parsed) = Url::parse(storage_url) {
                if let Some(host) = parsed.host_str().map(str::to_string) {
                    if parsed.set_host(Some(&format!("snet-{host}"))).is_ok() {
                        return parsed.to_string();
                    }
                }
            }
        }
        storage_url.to_string()
    }

    fn token(&self) -> String {
        self.headers.get("X-Auth-Token").unwrap_or_default().to_string()
    }

    fn cdn_url(&self) -> String {
        self.headers
            .get("X-CDN-Management-Url")
            .unwrap_or_default()
            .to_string()
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionBuilder;

    fn auth_with_response(pairs: &[(&str, &str)]) -> V1Auth {
        let mut auth = V1Auth::new();
        let headers: Headers = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        auth.response(&headers, b"").unwrap();
        auth
    }

    #[test]
    fn test_request_shape() {
        let conn = ConnectionBuilder::new()
            .user_name("fred")
            .api_key("potato")
            .auth_url("https://auth.example.com/v1.0")
            .build()
            .unwrap();
        let mut auth = V1Auth::new();
        let req = auth.request(&conn).unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url, "https://auth.example.com/v1.0");
        assert!(req.body.is_none());
        assert!(req
            .headers
            .contains(&("X-Auth-User".to_string(), "fred".to_string())));
        assert!(req
            .headers
            .contains(&("X-Auth-Key".to_string(), "potato".to_string())));
    }

    #[test]
    fn test_response_queries() {
        let auth = auth_with_response(&[
            ("X-Storage-Url", "https://storage.example.com/v1/AUTH_fred"),
            ("X-Auth-Token", "token-123"),
            ("X-CDN-Management-Url", "https://cdn.example.com/v1/AUTH_fred"),
        ]);
        assert_eq!(
            auth.storage_url(EndpointType::Public),
            "https://storage.example.com/v1/AUTH_fred"
        );
        assert_eq!(auth.token(), "token-123");
        assert_eq!(auth.cdn_url(), "https://cdn.example.com/v1/AUTH_fred");
        assert!(auth.expires().is_none());
    }

    #[test]
    fn test_internal_endpoint_gets_snet_host() {
        let auth = auth_with_response(&[
            ("X-Storage-Url", "https://storage.example.com/v1/AUTH_fred"),
            ("X-Auth-Token", "token-123"),
        ]);
        assert_eq!(
            auth.storage_url(EndpointType::Internal),
            "https://snet-storage.example.com/v1/AUTH_fred"
        );
    }

    #[test]
    fn test_missing_headers_are_empty() {
        let auth = V1Auth::new();
        assert_eq!(auth.token(), "");
        assert_eq!(auth.storage_url(EndpointType::Public), "");
        assert_eq!(auth.cdn_url(), "");
    }
}
