//! Keystone v3 authentication
//!
//! A JSON POST to `<authURL>/auth/tokens`. The identity block carries either
//! password or token methods, optionally scoped to a trust or a project; the
//! token comes back in the `X-Subject-Token` response header and the catalog
//! inside the body.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use sc_core::{Headers, Result};

use super::{parse_expiry, AuthRequest, Authenticator, EndpointType};
use crate::connection::Connection;

const METHOD_PASSWORD: &str = "password";
const METHOD_TOKEN: &str = "token";
const CATALOG_TYPE_OBJECT_STORE: &str = "object-store";

#[derive(Debug, Default)]
pub(crate) struct V3Auth {
    auth: Option<V3AuthResponse>,
    headers: Headers,
    region: String,
}

impl V3Auth {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn endpoint_url(&self, catalog_type: &str, endpoint_type: EndpointType) -> String {
        let Some(auth) = &self.auth else {
            return String::new();
        };
        for catalog in &auth.token.catalog {
            if catalog.catalog_type != catalog_type {
                continue;
            }
            for endpoint in &catalog.endpoints {
                if endpoint.interface == endpoint_type.as_str()
                    && (self.region.is_empty() || self.region == endpoint.region)
                {
                    return endpoint.url.clone();
                }
            }
        }
        String::new()
    }
}

impl Authenticator for V3Auth {
    fn request(&mut self, conn: &Connection) -> Result<AuthRequest> {
        self.region = conn.region().to_string();

        let mut v3 = V3AuthRequest::default();
        if conn.user_name().is_empty() {
            // No user name: the api key is a token to rescope
            v3.auth.identity.methods = vec![METHOD_TOKEN.to_string()];
            v3.auth.identity.token = Some(V3Token {
                id: conn.api_key().to_string(),
            });
        } else {
            v3.auth.identity.methods = vec![METHOD_PASSWORD.to_string()];
            v3.auth.identity.password = Some(V3Password {
                user: V3User {
                    name: conn.user_name().to_string(),
                    password: conn.api_key().to_string(),
                    domain: V3Domain::from_parts(conn.domain(), conn.domain_id()),
                },
            });
        }

        if !conn.trust_id().is_empty() {
            v3.auth.scope = Some(V3Scope {
                trust: Some(V3Trust {
                    id: conn.trust_id().to_string(),
                }),
                project: None,
            });
        } else if !conn.tenant_id().is_empty() {
            v3.auth.scope = Some(V3Scope {
                trust: None,
                project: Some(V3Project {
                    id: Some(conn.tenant_id().to_string()),
                    name: None,
                    domain: None,
                }),
            });
        } else if !conn.tenant().is_empty() {
            // A project name is only unique within a domain
            let domain = V3Domain::from_parts(conn.domain(), conn.domain_id()).or(Some(V3Domain {
                name: Some("Default".to_string()),
                id: None,
            }));
            v3.auth.scope = Some(V3Scope {
                trust: None,
                project: Some(V3Project {
                    id: None,
                    name: Some(conn.tenant().to_string()),
                    domain,
                }),
            });
        }

        let mut url = conn.auth_url().trim_end_matches('/').to_string();
        url.push_str("/auth/tokens");

        Ok(AuthRequest {
            method: Method::POST,
            url,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(serde_json::to_vec(&v3)?),
        })
    }

    fn response(&mut self, headers: &Headers, body: &[u8]) -> Result<()> {
        self.headers = headers.clone();
        self.auth = Some(serde_json::from_slice(body)?);
        Ok(())
    }

    fn storage_url(&self, endpoint_type: EndpointType) -> String {
        self.endpoint_url(CATALOG_TYPE_OBJECT_STORE, endpoint_type)
    }

    fn token(&self) -> String {
        self.headers
            .get("X-Subject-Token")
            .unwrap_or_default()
            .to_string()
    }

    fn cdn_url(&self) -> String {
        String::new()
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        self.auth
            .as_ref()
            .and_then(|a| parse_expiry(&a.token.expires_at))
    }
}

// Request body
//
// https://docs.openstack.org/api-ref/identity/v3/#password-authentication-with-scoped-authorization

#[derive(Debug, Default, Serialize)]
struct V3AuthRequest {
    auth: V3AuthBlock,
}

#[derive(Debug, Default, Serialize)]
struct V3AuthBlock {
    identity: V3Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<V3Scope>,
}

#[derive(Debug, Default, Serialize)]
struct V3Identity {
    methods: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<V3Password>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<V3Token>,
}

#[derive(Debug, Serialize)]
struct V3Password {
    user: V3User,
}

#[derive(Debug, Serialize)]
struct V3User {
    name: String,
    password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<V3Domain>,
}

#[derive(Debug, Serialize)]
struct V3Token {
    id: String,
}

#[derive(Debug, Serialize)]
struct V3Scope {
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<V3Project>,
    #[serde(rename = "OS-TRUST:trust", skip_serializing_if = "Option::is_none")]
    trust: Option<V3Trust>,
}

#[derive(Debug, Serialize)]
struct V3Project {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<V3Domain>,
}

#[derive(Debug, Serialize)]
struct V3Domain {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl V3Domain {
    fn from_parts(name: &str, id: &str) -> Option<V3Domain> {
        if !name.is_empty() {
            Some(V3Domain {
                id: None,
                name: Some(name.to_string()),
            })
        } else if !id.is_empty() {
            Some(V3Domain {
                id: Some(id.to_string()),
                name: None,
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct V3Trust {
    id: String,
}

// Response body

#[derive(Debug, Default, Deserialize)]
struct V3AuthResponse {
    token: V3TokenResponse,
}

#[derive(Debug, Default, Deserialize)]
struct V3TokenResponse {
    #[serde(default)]
    expires_at: String,
    #[serde(default)]
    catalog: Vec<V3Catalog>,
}

#[derive(Debug, Default, Deserialize)]
struct V3Catalog {
    #[serde(rename = "type", default)]
    catalog_type: String,
    #[serde(default)]
    endpoints: Vec<V3Endpoint>,
}

#[derive(Debug, Default, Deserialize)]
struct V3Endpoint {
    #[serde(default)]
    url: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    interface: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionBuilder;
    use serde_json::{json, Value};

    const CATALOG: &str = r#"{
        "token": {
            "expires_at": "2026-08-03T09:00:00.000000Z",
            "catalog": [
                {
                    "type": "object-store",
                    "endpoints": [
                        {"url": "https://internal.example.com/v1/AUTH_p",
                         "region": "RegionOne", "interface": "internal"},
                        {"url": "https://public.example.com/v1/AUTH_p",
                         "region": "RegionOne", "interface": "public"},
                        {"url": "https://admin.example.com/v1/AUTH_p",
                         "region": "RegionOne", "interface": "admin"},
                        {"url": "https://public.two.example.com/v1/AUTH_p",
                         "region": "RegionTwo", "interface": "public"}
                    ]
                }
            ]
        }
    }"#;

    fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new().auth_url("https://identity.example.com/v3")
    }

    fn request_body(conn: &Connection) -> (AuthRequest, Value) {
        let mut auth = V3Auth::new();
        let req = auth.request(conn).unwrap();
        let body = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        (req, body)
    }

    #[test]
    fn test_password_with_domain_name() {
        let conn = builder()
            .user_name("zoe")
            .api_key("pw")
            .domain("staff")
            .build()
            .unwrap();
        let (req, body) = request_body(&conn);
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url, "https://identity.example.com/v3/auth/tokens");
        assert_eq!(
            body,
            json!({
                "auth": {
                    "identity": {
                        "methods": ["password"],
                        "password": {
                            "user": {
                                "name": "zoe",
                                "password": "pw",
                                "domain": {"name": "staff"}
                            }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_token_method_without_user_name() {
        let conn = builder().api_key("existing-token").build().unwrap();
        let (_, body) = request_body(&conn);
        assert_eq!(
            body,
            json!({
                "auth": {
                    "identity": {
                        "methods": ["token"],
                        "token": {"id": "existing-token"}
                    }
                }
            })
        );
    }

    #[test]
    fn test_trust_scope_wins() {
        let conn = builder()
            .user_name("zoe")
            .api_key("pw")
            .trust_id("trust-9")
            .tenant_id("ignored")
            .build()
            .unwrap();
        let (_, body) = request_body(&conn);
        assert_eq!(
            body["auth"]["scope"],
            json!({"OS-TRUST:trust": {"id": "trust-9"}})
        );
    }

    #[test]
    fn test_project_id_scope() {
        let conn = builder()
            .user_name("zoe")
            .api_key("pw")
            .tenant_id("p-123")
            .build()
            .unwrap();
        let (_, body) = request_body(&conn);
        assert_eq!(body["auth"]["scope"], json!({"project": {"id": "p-123"}}));
    }

    #[test]
    fn test_project_name_defaults_domain() {
        let conn = builder()
            .user_name("zoe")
            .api_key("pw")
            .tenant("shiny")
            .build()
            .unwrap();
        let (_, body) = request_body(&conn);
        assert_eq!(
            body["auth"]["scope"],
            json!({"project": {"name": "shiny", "domain": {"name": "Default"}}})
        );

        let conn = builder()
            .user_name("zoe")
            .api_key("pw")
            .tenant("shiny")
            .domain_id("d-7")
            .build()
            .unwrap();
        let (_, body) = request_body(&conn);
        assert_eq!(
            body["auth"]["scope"]["project"]["domain"],
            json!({"id": "d-7"})
        );
    }

    #[test]
    fn test_response_queries() {
        let conn = builder().user_name("zoe").api_key("pw").build().unwrap();
        let mut auth = V3Auth::new();
        let _ = auth.request(&conn).unwrap();

        let headers: Headers = [("X-Subject-Token", "subject-7")].into();
        auth.response(&headers, CATALOG.as_bytes()).unwrap();

        assert_eq!(auth.token(), "subject-7");
        assert_eq!(
            auth.storage_url(EndpointType::Public),
            "https://public.example.com/v1/AUTH_p"
        );
        assert_eq!(
            auth.storage_url(EndpointType::Internal),
            "https://internal.example.com/v1/AUTH_p"
        );
        assert_eq!(
            auth.storage_url(EndpointType::Admin),
            "https://admin.example.com/v1/AUTH_p"
        );
        assert_eq!(auth.cdn_url(), "");
        assert!(auth.expires().is_some());
    }

    #[test]
    fn test_region_filter() {
        let conn = builder()
            .user_name("zoe")
            .api_key("pw")
            .region("RegionTwo")
            .build()
            .unwrap();
        let mut auth = V3Auth::new();
        let _ = auth.request(&conn).unwrap();
        auth.response(&Headers::new(), CATALOG.as_bytes()).unwrap();
        assert_eq!(
            auth.storage_url(EndpointType::Public),
            "https://public.two.example.com/v1/AUTH_p"
        );
        // RegionTwo has no internal interface
        assert_eq!(auth.storage_url(EndpointType::Internal), "");
    }
}
