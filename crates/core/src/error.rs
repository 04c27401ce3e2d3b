//! Error types for sc-core
//!
//! Provides the error taxonomy shared by every layer of the client, plus the
//! status-code maps the request pipeline consults when turning an HTTP reply
//! into a typed error.

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage operations
///
/// Protocol errors keep their originating HTTP status code reachable through
/// [`Error::status`] so callers can match on either the kind or the code.
#[derive(Error, Debug)]
pub enum Error {
    /// The identity service rejected the credentials (401)
    #[error("authorization failed")]
    AuthorizationFailed,

    /// The server rejected the request as malformed (400)
    #[error("bad request")]
    BadRequest,

    /// The server refused the operation (403)
    #[error("operation forbidden")]
    Forbidden,

    /// Conditional GET matched and the object was not returned (304)
    #[error("not modified")]
    NotModified,

    /// The container does not exist (404)
    #[error("container not found")]
    ContainerNotFound,

    /// The container still holds objects and cannot be deleted (409)
    #[error("container not empty")]
    ContainerNotEmpty,

    /// The object does not exist (404)
    #[error("object not found")]
    ObjectNotFound,

    /// Hash or length mismatch between client and server (422)
    #[error("object corrupted")]
    ObjectCorrupted,

    /// The object exceeds the server's size limit (413)
    #[error("object too large")]
    TooLargeObject,

    /// The server is rate limiting this account (429 or 498)
    #[error("rate limited (status {0})")]
    RateLimit(u16),

    /// Any other non-2xx status with no dedicated mapping
    #[error("HTTP error: {0}")]
    Http(u16),

    /// No data moved on a stream within the configured window
    #[error("timeout when reading or writing data")]
    Timeout,

    /// Operation requires a DLO or SLO manifest but found a plain object
    #[error("not a large object")]
    NotLargeObject,

    /// The server does not advertise static large object support
    #[error("SLO not supported")]
    SloNotSupported,

    /// Authentication setup or identity response problem
    #[error("auth error: {0}")]
    Auth(String),

    /// A response header was missing or failed to parse
    #[error("bad header '{name}': {reason}")]
    BadHeader { name: String, reason: String },

    /// Transport-level failure (connect, TLS, broken stream)
    #[error("network error: {0}")]
    Network(String),

    /// URL composition failure
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON body failed to parse or serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O failure
    #[error("IO error: {0}")]
    Io(std::io::Error),

    /// Operation not expressible against the store
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// The HTTP status code this error was derived from, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::AuthorizationFailed => Some(401),
            Error::BadRequest => Some(400),
            Error::Forbidden => Some(403),
            Error::NotModified => Some(304),
            Error::ContainerNotFound | Error::ObjectNotFound => Some(404),
            Error::ContainerNotEmpty => Some(409),
            Error::ObjectCorrupted => Some(422),
            Error::TooLargeObject => Some(413),
            Error::RateLimit(code) | Error::Http(code) => Some(*code),
            _ => None,
        }
    }

    /// True for the two 404 flavors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ContainerNotFound | Error::ObjectNotFound)
    }

    /// Helper for missing/unparseable headers
    pub fn bad_header(name: &str, reason: impl ToString) -> Error {
        Error::BadHeader {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Error::Timeout
        } else {
            Error::Io(err)
        }
    }
}

/// A per-call table translating HTTP status codes into domain errors
///
/// The pipeline consults the map first; on a miss, `2xx` is success and
/// anything else becomes [`Error::Http`].
pub type ErrorMap = fn(u16) -> Option<Error>;

/// Map for authentication requests
pub fn auth_error_map(status: u16) -> Option<Error> {
    match status {
        401 => Some(Error::AuthorizationFailed),
        _ => None,
    }
}

/// Map for account and container requests
pub fn container_error_map(status: u16) -> Option<Error> {
    match status {
        400 => Some(Error::BadRequest),
        403 => Some(Error::Forbidden),
        404 => Some(Error::ContainerNotFound),
        409 => Some(Error::ContainerNotEmpty),
        413 => Some(Error::TooLargeObject),
        429 | 498 => Some(Error::RateLimit(status)),
        _ => None,
    }
}

/// Map for object requests
pub fn object_error_map(status: u16) -> Option<Error> {
    match status {
        304 => Some(Error::NotModified),
        404 => Some(Error::ObjectNotFound),
        413 => Some(Error::TooLargeObject),
        422 => Some(Error::ObjectCorrupted),
        _ => None,
    }
}

/// Apply the per-call map, then the generic 2xx rule
pub fn check_status(status: u16, map: Option<ErrorMap>) -> Result<()> {
    if let Some(map) = map {
        if let Some(err) = map(status) {
            return Err(err);
        }
    }
    if !(200..300).contains(&status) {
        return Err(Error::Http(status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_hits() {
        assert!(matches!(
            auth_error_map(401),
            Some(Error::AuthorizationFailed)
        ));
        assert!(matches!(
            container_error_map(404),
            Some(Error::ContainerNotFound)
        ));
        assert!(matches!(
            container_error_map(409),
            Some(Error::ContainerNotEmpty)
        ));
        assert!(matches!(
            container_error_map(429),
            Some(Error::RateLimit(429))
        ));
        assert!(matches!(
            container_error_map(498),
            Some(Error::RateLimit(498))
        ));
        assert!(matches!(object_error_map(304), Some(Error::NotModified)));
        assert!(matches!(object_error_map(404), Some(Error::ObjectNotFound)));
        assert!(matches!(
            object_error_map(422),
            Some(Error::ObjectCorrupted)
        ));
        assert!(object_error_map(200).is_none());
    }

    #[test]
    fn test_check_status_fallthrough() {
        assert!(check_status(204, Some(object_error_map)).is_ok());
        assert!(check_status(201, None).is_ok());

        match check_status(500, Some(object_error_map)) {
            Err(Error::Http(500)) => {}
            other => panic!("expected Http(500), got {other:?}"),
        }
    }

    #[test]
    fn test_map_consulted_before_generic_rule() {
        // 304 is outside 2xx but must map to NotModified, not Http(304)
        match check_status(304, Some(object_error_map)) {
            Err(Error::NotModified) => {}
            other => panic!("expected NotModified, got {other:?}"),
        }
    }

    #[test]
    fn test_status_reaches_caller() {
        assert_eq!(Error::ObjectNotFound.status(), Some(404));
        assert_eq!(Error::RateLimit(498).status(), Some(498));
        assert_eq!(Error::Http(503).status(), Some(503));
        assert_eq!(Error::Timeout.status(), None);
    }

    #[test]
    fn test_io_timeout_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "stalled");
        assert!(matches!(Error::from(io), Error::Timeout));

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(Error::from(io), Error::Io(_)));
    }
}
