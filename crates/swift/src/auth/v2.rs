//! Keystone v2.0 / Rackspace authentication
//!
//! A JSON POST to `<authURL>/tokens` with either password credentials or the
//! Rackspace API-key block. Whether the account wants a password or an API
//! key is not knowable up front, so the initial guess is toggled on each
//! failed attempt and pinned once one variant succeeds.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use sc_core::{Headers, Result};

use super::{parse_expiry, AuthRequest, Authenticator, EndpointType};
use crate::connection::Connection;

#[derive(Debug, Default)]
pub(crate) struct V2Auth {
    auth: Option<V2AuthResponse>,
    region: String,
    /// Use the Rackspace API key block instead of password credentials
    use_api_key: bool,
    /// Once a response parsed, stop toggling the credential mode
    use_api_key_ok: bool,
    not_first: bool,
}

impl V2Auth {
    pub(crate) fn new(use_api_key: bool) -> Self {
        Self {
            use_api_key,
            ..Self::default()
        }
    }

    /// The endpoint of `catalog_type`, preferring the caller's region and
    /// falling back to the first entry of that type.
    fn endpoint_url(&self, catalog_type: &str, endpoint_type: EndpointType) -> String {
        let Some(auth) = &self.auth else {
            return String::new();
        };
        let mut fallback = None;
        for catalog in &auth.access.service_catalog {
            if catalog.catalog_type != catalog_type {
                continue;
            }
            for endpoint in &catalog.endpoints {
                let url = match endpoint_type {
                    EndpointType::Internal => &endpoint.internal_url,
                    EndpointType::Admin => &endpoint.admin_url,
                    EndpointType::Public => &endpoint.public_url,
                };
                if url.is_empty() {
                    continue;
                }
                if self.region.is_empty() || self.region == endpoint.region {
                    return url.clone();
                }
                if fallback.is_none() {
                    fallback = Some(url.clone());
                }
            }
        }
        fallback.unwrap_or_default()
    }
}

impl Authenticator for V2Auth {
    fn request(&mut self, conn: &Connection) -> Result<AuthRequest> {
        self.region = conn.region().to_string();
        // Toggle the credential mode if the previous attempt failed
        if self.not_first && !self.use_api_key_ok {
            self.use_api_key = !self.use_api_key;
        }
        self.not_first = true;

        let body = if self.use_api_key {
            serde_json::to_vec(&V2ApiKeyRequest {
                auth: V2ApiKeyAuth {
                    api_key_credentials: V2ApiKeyCredentials {
                        username: conn.user_name().to_string(),
                        api_key: conn.api_key().to_string(),
                    },
                    tenant_name: none_if_empty(conn.tenant()),
                    tenant_id: none_if_empty(conn.tenant_id()),
                },
            })?
        } else {
            serde_json::to_vec(&V2PasswordRequest {
                auth: V2PasswordAuth {
                    password_credentials: V2PasswordCredentials {
                        username: conn.user_name().to_string(),
                        password: conn.api_key().to_string(),
                    },
                    tenant_name: none_if_empty(conn.tenant()),
                    tenant_id: none_if_empty(conn.tenant_id()),
                },
            })?
        };

        let mut url = conn.auth_url().to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str("tokens");

        Ok(AuthRequest {
            method: Method::POST,
            url,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
        })
    }

    fn response(&mut self, _headers: &Headers, body: &[u8]) -> Result<()> {
        let auth: V2AuthResponse = serde_json::from_slice(body)?;
        self.auth = Some(auth);
        // This credential mode worked; no need to toggle any more
        self.use_api_key_ok = true;
        Ok(())
    }

    fn storage_url(&self, endpoint_type: EndpointType) -> String {
        self.endpoint_url("object-store", endpoint_type)
    }

    fn token(&self) -> String {
        self.auth
            .as_ref()
            .map(|a| a.access.token.id.clone())
            .unwrap_or_default()
    }

    fn cdn_url(&self) -> String {
        self.endpoint_url("rax:object-cdn", EndpointType::Public)
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        self.auth
            .as_ref()
            .and_then(|a| parse_expiry(&a.access.token.expires))
    }
}

fn none_if_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// Request bodies
//
// https://docs.openstack.org/api-ref/identity/v2/
// https://docs.rackspace.com/docs/cloud-files-getting-started

#[derive(Debug, Serialize)]
struct V2PasswordRequest {
    auth: V2PasswordAuth,
}

#[derive(Debug, Serialize)]
struct V2PasswordAuth {
    #[serde(rename = "passwordCredentials")]
    password_credentials: V2PasswordCredentials,
    #[serde(rename = "tenantName", skip_serializing_if = "Option::is_none")]
    tenant_name: Option<String>,
    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct V2PasswordCredentials {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct V2ApiKeyRequest {
    auth: V2ApiKeyAuth,
}

#[derive(Debug, Serialize)]
struct V2ApiKeyAuth {
    #[serde(rename = "RAX-KSKEY:apiKeyCredentials")]
    api_key_credentials: V2ApiKeyCredentials,
    #[serde(rename = "tenantName", skip_serializing_if = "Option::is_none")]
    tenant_name: Option<String>,
    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct V2ApiKeyCredentials {
    username: String,
    #[serde(rename = "apiKey")]
    api_key: String,
}

// Response body

#[derive(Debug, Default, Deserialize)]
struct V2AuthResponse {
    access: V2Access,
}

#[derive(Debug, Default, Deserialize)]
struct V2Access {
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<V2Catalog>,
    #[serde(default)]
    token: V2Token,
}

#[derive(Debug, Default, Deserialize)]
struct V2Catalog {
    #[serde(default)]
    endpoints: Vec<V2Endpoint>,
    #[serde(rename = "type", default)]
    catalog_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct V2Endpoint {
    #[serde(rename = "internalURL", default)]
    internal_url: String,
    #[serde(rename = "publicURL", default)]
    public_url: String,
    #[serde(rename = "adminURL", default)]
    admin_url: String,
    #[serde(default)]
    region: String,
}

#[derive(Debug, Default, Deserialize)]
struct V2Token {
    #[serde(default)]
    expires: String,
    #[serde(default)]
    id: String,
}
