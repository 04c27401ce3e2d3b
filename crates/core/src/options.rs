//! Listing options
//!
//! Options for container and object listings, serialized into the query
//! parameters the server understands. Zero/empty fields are omitted.

use crate::headers::Headers;

/// Default page size used by the `*_all` pagination helpers
pub const DEFAULT_LISTING_LIMIT: u32 = 10_000;

/// Options for container listings
#[derive(Debug, Clone, Default)]
pub struct ContainersOpts {
    /// Limit the number of results to at most this many values
    pub limit: Option<u32>,

    /// Return container names greater in value than this marker
    pub marker: Option<String>,

    /// Return container names less in value than this marker
    pub end_marker: Option<String>,

    /// Any additional HTTP headers
    pub headers: Option<Headers>,
}

impl ContainersOpts {
    /// Query parameters for this listing
    pub fn parse(&self) -> Vec<(String, String)> {
        let mut v = Vec::new();
        if let Some(limit) = self.limit {
            if limit > 0 {
                v.push(("limit".to_string(), limit.to_string()));
            }
        }
        push_opt(&mut v, "marker", &self.marker);
        push_opt(&mut v, "end_marker", &self.end_marker);
        v
    }
}

/// Options for object listings
#[derive(Debug, Clone, Default)]
pub struct ObjectsOpts {
    /// Limit the number of results to at most this many values
    pub limit: Option<u32>,

    /// Return object names greater in value than this marker
    pub marker: Option<String>,

    /// Return object names less in value than this marker
    pub end_marker: Option<String>,

    /// Limit results to object names beginning with this substring
    pub prefix: Option<String>,

    /// Return the object names nested in this pseudo path
    pub path: Option<String>,

    /// Collapse object names nested past this character into `subdir` rows
    pub delimiter: Option<char>,

    /// Any additional HTTP headers
    pub headers: Option<Headers>,
}

impl ObjectsOpts {
    /// Query parameters for this listing
    pub fn parse(&self) -> Vec<(String, String)> {
        let mut v = Vec::new();
        if let Some(limit) = self.limit {
            if limit > 0 {
                v.push(("limit".to_string(), limit.to_string()));
            }
        }
        push_opt(&mut v, "marker", &self.marker);
        push_opt(&mut v, "end_marker", &self.end_marker);
        push_opt(&mut v, "prefix", &self.prefix);
        push_opt(&mut v, "path", &self.path);
        if let Some(delimiter) = self.delimiter {
            v.push(("delimiter".to_string(), delimiter.to_string()));
        }
        v
    }
}

fn push_opt(v: &mut Vec<(String, String)>, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        if !value.is_empty() {
            v.push((name.to_string(), value.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containers_opts_empty() {
        assert!(ContainersOpts::default().parse().is_empty());
    }

    #[test]
    fn test_containers_opts_full() {
        let opts = ContainersOpts {
            limit: Some(100),
            marker: Some("m".to_string()),
            end_marker: Some("z".to_string()),
            headers: None,
        };
        assert_eq!(
            opts.parse(),
            vec![
                ("limit".to_string(), "100".to_string()),
                ("marker".to_string(), "m".to_string()),
                ("end_marker".to_string(), "z".to_string()),
            ]
        );
    }

    #[test]
    fn test_objects_opts() {
        let opts = ObjectsOpts {
            prefix: Some("photos/".to_string()),
            delimiter: Some('/'),
            ..Default::default()
        };
        assert_eq!(
            opts.parse(),
            vec![
                ("prefix".to_string(), "photos/".to_string()),
                ("delimiter".to_string(), "/".to_string()),
            ]
        );
    }

    #[test]
    fn test_zero_limit_omitted() {
        let opts = ObjectsOpts {
            limit: Some(0),
            ..Default::default()
        };
        assert!(opts.parse().is_empty());
    }
}
