//! Account, container and object listing types
//!
//! These deserialize straight from the server's `format=json` listings. The
//! listing timestamp format has no zone suffix and sub-second digits the HEAD
//! date does not carry, so both parsers live here next to the types.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Listing timestamp layout, fractional seconds stripped before parsing
const LISTING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Content type the server and this client use for pseudo-directories
pub const DIRECTORY_CONTENT_TYPE: &str = "application/directory";

/// Information about this account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Total number of bytes used
    pub bytes_used: i64,
    /// Total number of containers
    pub containers: i64,
    /// Total number of objects
    pub objects: i64,
}

/// Information about a container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Name of the container
    pub name: String,
    /// Number of objects in the container
    #[serde(default)]
    pub count: i64,
    /// Total number of bytes used in the container
    #[serde(default)]
    pub bytes: i64,
}

/// What kind of object a HEAD revealed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    /// A plain object
    #[default]
    Normal,
    /// A static large object manifest
    StaticLargeObject,
    /// A dynamic large object manifest
    DynamicLargeObject,
}

/// Information about an object, from a listing entry or a HEAD
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Object name
    #[serde(default)]
    pub name: String,

    /// Content type, eg `application/directory`
    #[serde(default)]
    pub content_type: String,

    /// Size in bytes
    #[serde(default)]
    pub bytes: i64,

    /// Last modified time as the server supplied it,
    /// eg `2011-06-30T08:20:47.736680`
    #[serde(default, rename = "last_modified")]
    pub server_last_modified: String,

    /// Last modified time parsed to second precision
    #[serde(skip)]
    pub last_modified: Option<DateTime<Utc>>,

    /// MD5 hash, eg `d41d8cd98f00b204e9800998ecf8427e`
    #[serde(default)]
    pub hash: String,

    /// Set when a delimiter listing collapsed a prefix into this entry;
    /// no real object of this name exists
    #[serde(skip)]
    pub pseudo_directory: bool,

    /// Raw `subdir` value, present only on pseudo-directory entries
    #[serde(default, rename = "subdir")]
    pub sub_dir: String,

    /// Plain, static-large or dynamic-large
    #[serde(skip)]
    pub object_type: ObjectType,
}

impl Object {
    /// Fix up a freshly deserialized listing entry: promote `subdir` rows to
    /// pseudo-directories and parse the timestamp.
    pub fn normalize(&mut self) -> Result<()> {
        if !self.sub_dir.is_empty() {
            self.name = self.sub_dir.clone();
            self.pseudo_directory = true;
            self.content_type = DIRECTORY_CONTENT_TYPE.to_string();
        }
        if !self.server_last_modified.is_empty() {
            self.last_modified = Some(parse_listing_time(&self.server_last_modified)?);
        }
        Ok(())
    }
}

/// Parse a listing timestamp, dropping fractional seconds to stay consistent
/// with the one-second precision a HEAD reports.
pub fn parse_listing_time(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.split('.').next().unwrap_or(value);
    let naive = NaiveDateTime::parse_from_str(trimmed, LISTING_TIME_FORMAT)
        .map_err(|e| Error::bad_header("Last-Modified", format!("{value:?}: {e}")))?;
    Ok(naive.and_utc())
}

/// Parse an HTTP date header, eg `Fri, 12 Jun 2010 13:40:18 GMT`
pub fn parse_http_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::bad_header("Last-Modified", format!("{value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_container_listing_parse() {
        let json = r#"[{"name":"test","count":1015,"bytes":315575604},
                       {"name":"test2","count":1,"bytes":0}]"#;
        let containers: Vec<Container> = serde_json::from_str(json).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "test");
        assert_eq!(containers[0].count, 1015);
        assert_eq!(containers[1].bytes, 0);
    }

    #[test]
    fn test_object_listing_parse() {
        let json = r#"[{"name":"duck.txt","content_type":"text/plain",
                        "bytes":5,"hash":"827ccb0eea8a706c4c34a16891f84e7b",
                        "last_modified":"2012-11-11T14:49:47.887250"}]"#;
        let mut objects: Vec<Object> = serde_json::from_str(json).unwrap();
        for o in &mut objects {
            o.normalize().unwrap();
        }
        let o = &objects[0];
        assert_eq!(o.name, "duck.txt");
        assert_eq!(o.bytes, 5);
        assert!(!o.pseudo_directory);
        let t = o.last_modified.unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2012, 11, 11));
        // fractional seconds dropped
        assert_eq!((t.hour(), t.minute(), t.second()), (14, 49, 47));
        assert_eq!(t.nanosecond(), 0);
    }

    #[test]
    fn test_subdir_becomes_pseudo_directory() {
        let json = r#"[{"subdir":"photos/"}]"#;
        let mut objects: Vec<Object> = serde_json::from_str(json).unwrap();
        objects[0].normalize().unwrap();
        let o = &objects[0];
        assert_eq!(o.name, "photos/");
        assert!(o.pseudo_directory);
        assert_eq!(o.content_type, DIRECTORY_CONTENT_TYPE);
        assert_eq!(o.object_type, ObjectType::Normal);
    }

    #[test]
    fn test_parse_http_time() {
        let t = parse_http_time("Fri, 12 Jun 2010 13:40:18 GMT").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2010, 6, 12));
        assert!(parse_http_time("not a date").is_err());
    }

    #[test]
    fn test_parse_listing_time_no_fraction() {
        let t = parse_listing_time("2011-06-30T08:20:47").unwrap();
        assert_eq!(t.second(), 47);
        assert!(parse_listing_time("junk").is_err());
    }
}
