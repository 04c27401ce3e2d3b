//! Account operations

use reqwest::Method;

use sc_core::{container_error_map, Account, Headers, Result};

use crate::connection::{Connection, RequestOpts};

impl Connection {
    /// Info about this account, with its headers
    ///
    /// Use [`Headers::account_metadata`] to read the metadata out of the
    /// returned headers.
    pub async fn account(&self) -> Result<(Account, Headers)> {
        let resp = self
            .call(RequestOpts {
                operation: Method::HEAD,
                error_map: Some(container_error_map),
                no_response: true,
                ..Default::default()
            })
            .await?;
        let account = Account {
            bytes_used: resp.headers.get_i64("X-Account-Bytes-Used")?,
            containers: resp.headers.get_i64("X-Account-Container-Count")?,
            objects: resp.headers.get_i64("X-Account-Object-Count")?,
        };
        Ok((account, resp.headers))
    }

    /// Add, replace or remove account metadata
    ///
    /// The POST replaces the entire metadata set: build the headers with
    /// [`sc_core::Metadata::account_headers`] and leave out keys to delete
    /// them.
    pub async fn account_update(&self, headers: Headers) -> Result<()> {
        self.call(RequestOpts {
            operation: Method::POST,
            headers: Some(headers),
            error_map: Some(container_error_map),
            no_response: true,
            ..Default::default()
        })
        .await?;
        Ok(())
    }
}
