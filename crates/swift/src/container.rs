//! Container operations
//!
//! Listings come in two shapes: plain-text name-per-line, and `format=json`
//! with counts and sizes. The `*_all` variants paginate with `marker` until
//! a short page arrives.

use reqwest::Method;

use sc_core::{
    container_error_map, Container, ContainersOpts, Headers, Result, DEFAULT_LISTING_LIMIT,
};

use crate::connection::{Connection, RequestOpts};

impl Connection {
    /// Names of the containers in this account
    pub async fn container_names(&self, opts: Option<&ContainersOpts>) -> Result<Vec<String>> {
        let (parameters, headers) = parse_opts(opts);
        let resp = self
            .call(RequestOpts {
                operation: Method::GET,
                parameters,
                headers,
                error_map: Some(container_error_map),
                ..Default::default()
            })
            .await?;
        resp.body.lines().await
    }

    /// Containers in this account with their object counts and sizes
    pub async fn containers(&self, opts: Option<&ContainersOpts>) -> Result<Vec<Container>> {
        let (mut parameters, headers) = parse_opts(opts);
        parameters.push(("format".to_string(), "json".to_string()));
        let resp = self
            .call(RequestOpts {
                operation: Method::GET,
                parameters,
                headers,
                error_map: Some(container_error_map),
                ..Default::default()
            })
            .await?;
        resp.body.json().await
    }

    /// All containers, following markers past the listing limit
    pub async fn containers_all(&self, opts: Option<&ContainersOpts>) -> Result<Vec<Container>> {
        let mut opts = all_opts(opts);
        let limit = opts.limit.unwrap_or(DEFAULT_LISTING_LIMIT);
        let mut containers: Vec<Container> = Vec::new();
        loop {
            let page = self.containers(Some(&opts)).await?;
            let short = (page.len() as u32) < limit;
            containers.extend(page);
            if short {
                break;
            }
            opts.marker = containers.last().map(|c| c.name.clone());
        }
        Ok(containers)
    }

    /// All container names, following markers past the listing limit
    pub async fn container_names_all(
        &self,
        opts: Option<&ContainersOpts>,
    ) -> Result<Vec<String>> {
        let mut opts = all_opts(opts);
        let limit = opts.limit.unwrap_or(DEFAULT_LISTING_LIMIT);
        let mut names: Vec<String> = Vec::new();
        loop {
            let page = self.container_names(Some(&opts)).await?;
            let short = (page.len() as u32) < limit;
            names.extend(page);
            if short {
                break;
            }
            opts.marker = names.last().cloned();
        }
        Ok(names)
    }

    /// Info about a single container, with its headers
    pub async fn container(&self, container: &str) -> Result<(Container, Headers)> {
        let resp = self
            .call(RequestOpts {
                container: Some(container),
                operation: Method::HEAD,
                error_map: Some(container_error_map),
                no_response: true,
                ..Default::default()
            })
            .await?;
        let info = Container {
            name: container.to_string(),
            bytes: resp.headers.get_i64("X-Container-Bytes-Used")?,
            count: resp.headers.get_i64("X-Container-Object-Count")?,
        };
        Ok((info, resp.headers))
    }

    /// Create the container
    ///
    /// No error if it already exists, but any metadata in `headers` is
    /// applied to it.
    pub async fn container_create(&self, container: &str, headers: Option<Headers>) -> Result<()> {
        self.call(RequestOpts {
            container: Some(container),
            operation: Method::PUT,
            headers,
            error_map: Some(container_error_map),
            no_response: true,
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    /// Delete the container
    ///
    /// May return `ContainerNotFound` or `ContainerNotEmpty`.
    pub async fn container_delete(&self, container: &str) -> Result<()> {
        self.call(RequestOpts {
            container: Some(container),
            operation: Method::DELETE,
            error_map: Some(container_error_map),
            no_response: true,
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    /// Add, replace or remove container metadata
    ///
    /// The POST replaces the entire metadata set.
    pub async fn container_update(&self, container: &str, headers: Headers) -> Result<()> {
        self.call(RequestOpts {
            container: Some(container),
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

fn parse_opts(opts: Option<&ContainersOpts>) -> (Vec<(String, String)>, Option<Headers>) {
    match opts {
        Some(opts) => (opts.parse(), opts.headers.clone()),
        None => (Vec::new(), None),
    }
}

/// Copy the options for pagination: apply the default limit, clear the marker
fn all_opts(opts: Option<&ContainersOpts>) -> ContainersOpts {
    let mut opts = opts.cloned().unwrap_or_default();
    if opts.limit.unwrap_or(0) == 0 {
        opts.limit = Some(DEFAULT_LISTING_LIMIT);
    }
    opts.marker = None;
    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_opts_defaults() {
        let opts = all_opts(None);
        assert_eq!(opts.limit, Some(DEFAULT_LISTING_LIMIT));
        assert!(opts.marker.is_none());
    }

    #[test]
    fn test_all_opts_keeps_caller_limit_and_clears_marker() {
        let caller = ContainersOpts {
            limit: Some(25),
            marker: Some("leftover".to_string()),
            ..Default::default()
        };
        let opts = all_opts(Some(&caller));
        assert_eq!(opts.limit, Some(25));
        assert!(opts.marker.is_none());
    }
}
