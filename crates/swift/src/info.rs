//! Server capability discovery
//!
//! Swift publishes its middleware configuration at `GET /info`, outside the
//! account path and without authentication. The client consults it before
//! static-large-object work (is SLO enabled, what minimum segment size does
//! it enforce) and before bulk deletes.

use std::collections::BTreeMap;

use sc_core::{Error, Result};
use url::Url;

use crate::connection::Connection;

/// Default minimum SLO segment size when the server does not report one
const DEFAULT_SLO_MIN_SEGMENT_SIZE: u64 = 1;

/// The server's `/info` document: middleware name → configuration blob
#[derive(Debug, Clone, Default)]
pub struct ServerInfo(BTreeMap<String, serde_json::Value>);

impl ServerInfo {
    /// Whether static large objects are enabled
    pub fn supports_slo(&self) -> bool {
        self.0.contains_key("slo")
    }

    /// Whether the bulk middleware accepts delete requests
    pub fn supports_bulk_delete(&self) -> bool {
        self.0.contains_key("bulk_delete")
    }

    /// The minimum segment size the SLO middleware will accept
    pub fn slo_min_segment_size(&self) -> u64 {
        self.0
            .get("slo")
            .and_then(|slo| slo.get("min_segment_size"))
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_SLO_MIN_SEGMENT_SIZE)
    }

    /// Raw configuration blob for a middleware
    pub fn get(&self, middleware: &str) -> Option<&serde_json::Value> {
        self.0.get(middleware)
    }
}

impl From<BTreeMap<String, serde_json::Value>> for ServerInfo {
    fn from(map: BTreeMap<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

impl Connection {
    /// Fetch the server's `/info` document
    pub async fn query_info(&self) -> Result<ServerInfo> {
        let (storage_url, _) = self.ensure_authenticated().await?;
        let mut url = Url::parse(&storage_url)?;
        url.set_path("/info");
        url.set_query(None);

        let resp = tokio::time::timeout(
            self.timeout(),
            self.http_client()
                .get(url)
                .header("User-Agent", self.user_agent())
                .send(),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|e| Error::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(Error::Http(status));
        }
        let map: BTreeMap<String, serde_json::Value> = tokio::time::timeout(
            self.timeout(),
            resp.json(),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|e| Error::Network(e.to_string()))?;
        Ok(ServerInfo(map))
    }

    /// `/info`, fetched once per connection and then served from cache
    pub async fn cached_query_info(&self) -> Result<ServerInfo> {
        let mut cache = self.info.lock().await;
        if let Some(info) = cache.as_ref() {
            return Ok(info.clone());
        }
        let info = self.query_info().await?;
        *cache = Some(info.clone());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_from(json: &str) -> ServerInfo {
        ServerInfo(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_slo_detection() {
        let info = info_from(r#"{"slo": {"min_segment_size": 1048576}}"#);
        assert!(info.supports_slo());
        assert_eq!(info.slo_min_segment_size(), 1048576);
        assert!(!info.supports_bulk_delete());
    }

    #[test]
    fn test_slo_min_size_default() {
        let info = info_from(r#"{"slo": {}}"#);
        assert!(info.supports_slo());
        assert_eq!(info.slo_min_segment_size(), 1);
    }

    #[test]
    fn test_no_slo() {
        let info = info_from(r#"{"swift": {"version": "2.33"}}"#);
        assert!(!info.supports_slo());
        assert_eq!(info.slo_min_segment_size(), 1);
        assert!(info.get("swift").is_some());
    }

    #[test]
    fn test_bulk_delete_detection() {
        let info = info_from(r#"{"bulk_delete": {"max_deletes_per_request": 10000}}"#);
        assert!(info.supports_bulk_delete());
    }
}
