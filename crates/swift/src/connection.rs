//! Connection and request pipeline
//!
//! Every storage operation funnels through [`Connection::call`]: it composes
//! the URL, attaches the token, enforces the timeouts, recovers once from an
//! expired token, and maps the response status through the per-call error
//! table. A `Connection` is safe to share between tasks; only the
//! authentication state sits behind a lock, so the common authenticated path
//! takes a read lock only.

use std::io;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::Method;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex, RwLock};
use tokio_util::io::{ReaderStream, StreamReader};
use url::Url;

use sc_core::{auth_error_map, check_status, Error, ErrorMap, Headers, Result};

use crate::auth::{new_authenticator, AuthVersion, Authenticator, EndpointType};
use crate::info::ServerInfo;
use crate::readers::{TimeoutReader, Watchdog, WatchdogReader};

/// Default user agent sent on every request
pub const DEFAULT_USER_AGENT: &str = concat!("sc-swift/", env!("CARGO_PKG_VERSION"));

/// Default bound on connection establishment
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on idle time between bytes on a stream
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default retry budget for transparent reauthentication
pub const DEFAULT_RETRIES: u32 = 3;

type BoxReader = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Authentication state, guarded by the connection's write lock
#[derive(Debug, Default)]
struct AuthState {
    storage_url: String,
    cdn_url: String,
    token: String,
    expires: Option<DateTime<Utc>>,
    authenticator: Option<Box<dyn Authenticator>>,
}

impl AuthState {
    fn authenticated(&self) -> bool {
        !self.storage_url.is_empty() && !self.token.is_empty()
    }

    fn expired(&self) -> bool {
        self.expires.map(|t| t <= Utc::now()).unwrap_or(false)
    }
}

/// A client handle for one account on a Swift-compatible store
///
/// Created through [`ConnectionBuilder`]. Cheap to share behind an `Arc`;
/// every method takes `&self`.
#[derive(Debug)]
pub struct Connection {
    user_name: String,
    api_key: String,
    auth_url: String,
    domain: String,
    domain_id: String,
    tenant: String,
    tenant_id: String,
    trust_id: String,
    region: String,
    auth_version: AuthVersion,
    endpoint_type: EndpointType,
    user_agent: String,
    timeout: Duration,
    retries: u32,
    client: reqwest::Client,
    auth: RwLock<AuthState>,
    pub(crate) info: Mutex<Option<ServerInfo>>,
}

/// Builder for [`Connection`]
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    user_name: String,
    api_key: String,
    auth_url: String,
    domain: String,
    domain_id: String,
    tenant: String,
    tenant_id: String,
    trust_id: String,
    region: String,
    auth_version: AuthVersion,
    endpoint_type: EndpointType,
    user_agent: Option<String>,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    retries: Option<u32>,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// User name for authentication
    pub fn user_name(mut self, value: impl Into<String>) -> Self {
        self.user_name = value.into();
        self
    }

    /// API key, password or (v3 token method) token
    pub fn api_key(mut self, value: impl Into<String>) -> Self {
        self.api_key = value.into();
        self
    }

    /// Identity service endpoint
    pub fn auth_url(mut self, value: impl Into<String>) -> Self {
        self.auth_url = value.into();
        self
    }

    /// User domain name (v3)
    pub fn domain(mut self, value: impl Into<String>) -> Self {
        self.domain = value.into();
        self
    }

    /// User domain id (v3)
    pub fn domain_id(mut self, value: impl Into<String>) -> Self {
        self.domain_id = value.into();
        self
    }

    /// Tenant or project name (v2/v3)
    pub fn tenant(mut self, value: impl Into<String>) -> Self {
        self.tenant = value.into();
        self
    }

    /// Tenant or project id (v2/v3)
    pub fn tenant_id(mut self, value: impl Into<String>) -> Self {
        self.tenant_id = value.into();
        self
    }

    /// Trust id to scope to (v3)
    pub fn trust_id(mut self, value: impl Into<String>) -> Self {
        self.trust_id = value.into();
        self
    }

    /// Preferred region when the catalog offers several
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Force a specific identity protocol version
    pub fn auth_version(mut self, value: AuthVersion) -> Self {
        self.auth_version = value;
        self
    }

    /// Which catalog endpoint to talk to
    pub fn endpoint_type(mut self, value: EndpointType) -> Self {
        self.endpoint_type = value;
        self
    }

    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.user_agent = Some(value.into());
        self
    }

    /// Bound on connection establishment
    pub fn connect_timeout(mut self, value: Duration) -> Self {
        self.connect_timeout = Some(value);
        self
    }

    /// Bound on idle time between bytes on request and response streams
    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    /// Retry budget for transparent reauthentication
    pub fn retries(mut self, value: u32) -> Self {
        self.retries = Some(value);
        self
    }

    pub fn build(self) -> Result<Connection> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Connection {
            user_name: self.user_name,
            api_key: self.api_key,
            auth_url: self.auth_url,
            domain: self.domain,
            domain_id: self.domain_id,
            tenant: self.tenant,
            tenant_id: self.tenant_id,
            trust_id: self.trust_id,
            region: self.region,
            auth_version: self.auth_version,
            endpoint_type: self.endpoint_type,
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            retries: self.retries.unwrap_or(DEFAULT_RETRIES),
            client,
            auth: RwLock::new(AuthState::default()),
            info: Mutex::new(None),
        })
    }
}

impl Connection {
    pub(crate) fn user_name(&self) -> &str {
        &self.user_name
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub(crate) fn domain(&self) -> &str {
        &self.domain
    }

    pub(crate) fn domain_id(&self) -> &str {
        &self.domain_id
    }

    pub(crate) fn tenant(&self) -> &str {
        &self.tenant
    }

    pub(crate) fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub(crate) fn trust_id(&self) -> &str {
        &self.trust_id
    }

    pub(crate) fn region(&self) -> &str {
        &self.region
    }

    pub(crate) fn auth_version(&self) -> AuthVersion {
        self.auth_version
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Whether a token and storage URL are currently held
    ///
    /// Doesn't check the credentials against the server.
    pub async fn authenticated(&self) -> bool {
        self.auth.read().await.authenticated()
    }

    /// The storage URL, if authenticated
    pub async fn storage_url(&self) -> Option<String> {
        let state = self.auth.read().await;
        if state.storage_url.is_empty() {
            None
        } else {
            Some(state.storage_url.clone())
        }
    }

    /// The CDN management URL, if the identity scheme supplied one
    pub async fn cdn_url(&self) -> Option<String> {
        let state = self.auth.read().await;
        if state.cdn_url.is_empty() {
            None
        } else {
            Some(state.cdn_url.clone())
        }
    }

    /// Authenticate now, replacing any held token
    pub async fn authenticate(&self) -> Result<()> {
        let mut state = self.auth.write().await;
        self.authenticate_locked(&mut state).await
    }

    /// Forget the token and storage URL; the next call re-authenticates
    pub async fn unauthenticate(&self) {
        let mut state = self.auth.write().await;
        state.storage_url.clear();
        state.token.clear();
        state.expires = None;
    }

    /// Install a storage URL and token directly, bypassing authentication
    ///
    /// Useful against stores with externally issued tokens.
    pub async fn set_storage(&self, storage_url: impl Into<String>, token: impl Into<String>) {
        let mut state = self.auth.write().await;
        state.storage_url = storage_url.into();
        state.token = token.into();
        state.expires = None;
    }

    async fn authenticate_locked(&self, state: &mut AuthState) -> Result<()> {
        if state.authenticator.is_none() {
            state.authenticator = Some(new_authenticator(self)?);
        }
        let authenticator = state
            .authenticator
            .as_mut()
            .ok_or_else(|| Error::Auth("no authenticator".to_string()))?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            let req = authenticator.request(self)?;
            match self.do_auth_request(&req).await {
                Ok((headers, body)) => {
                    authenticator.response(&headers, &body)?;
                    break;
                }
                // One immediate retry lets v2 toggle between password and
                // API key credentials.
                Err(Error::AuthorizationFailed) if attempts < 2 => {
                    tracing::debug!("authentication rejected, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        state.storage_url = authenticator.storage_url(self.endpoint_type);
        state.cdn_url = authenticator.cdn_url();
        state.token = authenticator.token();
        state.expires = authenticator.expires();
        if !state.authenticated() {
            state.storage_url.clear();
            state.token.clear();
            return Err(Error::Auth(
                "response didn't have storage url and auth token".to_string(),
            ));
        }
        tracing::debug!(storage_url = %state.storage_url, "authenticated");
        Ok(())
    }

    async fn do_auth_request(&self, req: &crate::auth::AuthRequest) -> Result<(Headers, Vec<u8>)> {
        let mut builder = self
            .client
            .request(req.method.clone(), &req.url)
            .header("User-Agent", &self.user_agent);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }
        let resp = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let headers = headers_from_response(resp.headers());
        let body = tokio::time::timeout(self.timeout, resp.bytes())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::Network(e.to_string()))?;
        check_status(status, Some(auth_error_map))?;
        Ok((headers, body.to_vec()))
    }

    /// Storage URL and token, authenticating under the write lock if needed.
    /// Concurrent callers block on the lock and re-check, so at most one
    /// authentication is in flight.
    pub(crate) async fn ensure_authenticated(&self) -> Result<(String, String)> {
        {
            let state = self.auth.read().await;
            if state.authenticated() && !state.expired() {
                return Ok((state.storage_url.clone(), state.token.clone()));
            }
        }
        let mut state = self.auth.write().await;
        if !state.authenticated() || state.expired() {
            self.authenticate_locked(&mut state).await?;
        }
        Ok((state.storage_url.clone(), state.token.clone()))
    }

    /// Drop the token, but only if nobody replaced it since we copied it
    async fn invalidate_token(&self, used: &str) {
        let mut state = self.auth.write().await;
        if state.token == used {
            state.storage_url.clear();
            state.token.clear();
            state.expires = None;
        }
    }

    /// The single entry point for storage requests
    pub(crate) async fn call(&self, opts: RequestOpts<'_>) -> Result<CallResponse> {
        let mut retries = opts.retries.unwrap_or(self.retries);
        let mut reauthed = false;

        // Split the body into a replayable form. Bytes replay freely; a
        // reader sits in a slot it is only taken from when the transport
        // first polls the body, so a 401 that arrives earlier can still be
        // retried safely.
        let (bytes_body, reader_slot): (Option<Bytes>, Option<Arc<StdMutex<Option<BoxReader>>>>) =
            match opts.body {
                Some(RequestBody::Bytes(b)) => (Some(b), None),
                Some(RequestBody::Reader(r)) => {
                    (None, Some(Arc::new(StdMutex::new(Some(r)))))
                }
                None => (None, None),
            };

        loop {
            let (storage_url, token) = self.ensure_authenticated().await?;
            let url = build_storage_url(
                &storage_url,
                opts.container,
                opts.object_name,
                &opts.parameters,
            )?;

            let mut builder = self
                .client
                .request(opts.operation.clone(), url.as_str())
                .header("User-Agent", &self.user_agent)
                .header("X-Auth-Token", &token);
            if let Some(headers) = &opts.headers {
                for (name, value) in headers.iter() {
                    builder = builder.header(name, value);
                }
            }

            // The watchdog guards the whole exchange: armed at the idle
            // timeout, kicked by request body progress, and raced against
            // the request below.
            let (watchdog, watchdog_rx) = Watchdog::new(self.timeout);
            let body_reader: Option<BodyReader> = if let Some(bytes) = &bytes_body {
                Some(BodyReader::Bytes(io::Cursor::new(bytes.clone())))
            } else {
                reader_slot
                    .as_ref()
                    .map(|slot| BodyReader::Lazy(slot.clone(), None))
            };
            if let Some(reader) = body_reader {
                let guarded = WatchdogReader::new(reader, self.timeout, watchdog);
                builder = builder
                    .body(reqwest::Body::wrap_stream(ReaderStream::with_capacity(
                        guarded, 64 * 1024,
                    )));
            }

            let resp = tokio::select! {
                res = builder.send() => res.map_err(|e| Error::Network(e.to_string()))?,
                _ = Watchdog::expired(watchdog_rx) => {
                    tracing::debug!(url = %url, "request timed out, cancelling");
                    return Err(Error::Timeout);
                }
            };

            let status = resp.status().as_u16();
            if status == 401 && retries > 0 && !reauthed {
                let replayable = match (&bytes_body, &reader_slot) {
                    (_, Some(slot)) => slot.lock().map(|s| s.is_some()).unwrap_or(false),
                    _ => true,
                };
                if replayable {
                    retries -= 1;
                    reauthed = true;
                    drop(resp);
                    tracing::debug!("got 401, reauthenticating");
                    self.invalidate_token(&token).await;
                    continue;
                }
            }

            let headers = headers_from_response(resp.headers());
            check_status(status, opts.error_map)?;

            let body = if opts.no_response {
                // Drain so the pooled connection can be reused
                let _ = tokio::time::timeout(self.timeout, resp.bytes()).await;
                ResponseBody::empty()
            } else {
                ResponseBody::new(resp, self.timeout)
            };
            return Ok(CallResponse { headers, body });
        }
    }
}

/// Request body for [`Connection::call`]
pub(crate) enum RequestBody {
    /// A replayable in-memory body
    Bytes(Bytes),
    /// A streaming body, consumed at most once
    Reader(BoxReader),
}

/// Options for a single pipeline call
pub(crate) struct RequestOpts<'a> {
    pub container: Option<&'a str>,
    pub object_name: Option<&'a str>,
    pub operation: Method,
    pub parameters: Vec<(String, String)>,
    pub headers: Option<Headers>,
    pub error_map: Option<ErrorMap>,
    /// Drain and discard the response body before returning
    pub no_response: bool,
    pub body: Option<RequestBody>,
    pub retries: Option<u32>,
}

impl Default for RequestOpts<'_> {
    fn default() -> Self {
        Self {
            container: None,
            object_name: None,
            operation: Method::GET,
            parameters: Vec::new(),
            headers: None,
            error_map: None,
            no_response: false,
            body: None,
            retries: None,
        }
    }
}

/// The COPY verb, which `reqwest` does not predefine
pub(crate) fn copy_method() -> Method {
    Method::from_bytes(b"COPY").expect("COPY is a valid method token")
}

/// Result of a pipeline call
///
/// The status was already vetted against the error map; what remains are
/// the headers and the (possibly drained) body.
pub(crate) struct CallResponse {
    pub headers: Headers,
    pub body: ResponseBody,
}

/// A response body bounded by a per-read timeout
pub(crate) struct ResponseBody {
    inner: Box<dyn AsyncRead + Send + Unpin>,
}

impl ResponseBody {
    fn new(resp: reqwest::Response, timeout: Duration) -> Self {
        let stream = resp
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let reader = TimeoutReader::new(StreamReader::new(stream), timeout);
        Self {
            inner: Box::new(reader),
        }
    }

    fn empty() -> Self {
        Self {
            inner: Box::new(tokio::io::empty()),
        }
    }

    /// Read the whole body
    pub(crate) async fn bytes(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.inner.read_to_end(&mut out).await?;
        Ok(out)
    }

    /// Read the whole body as newline-separated names
    pub(crate) async fn lines(self) -> Result<Vec<String>> {
        let bytes = self.bytes().await?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Parse the whole body as JSON
    pub(crate) async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl AsyncRead for ResponseBody {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Request body reader: replayable bytes, or a reader taken lazily out of
/// its slot on first poll
enum BodyReader {
    Bytes(io::Cursor<Bytes>),
    Lazy(Arc<StdMutex<Option<BoxReader>>>, Option<BoxReader>),
}

impl AsyncRead for BodyReader {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            BodyReader::Bytes(cursor) => std::pin::Pin::new(cursor).poll_read(cx, buf),
            BodyReader::Lazy(slot, taken) => {
                if taken.is_none() {
                    let mut guard = slot
                        .lock()
                        .map_err(|_| io::Error::new(io::ErrorKind::Other, "body slot poisoned"))?;
                    match guard.take() {
                        Some(reader) => *taken = Some(reader),
                        None => {
                            return std::task::Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::Other,
                                "request body already consumed",
                            )))
                        }
                    }
                }
                match taken.as_mut() {
                    Some(reader) => std::pin::Pin::new(reader).poll_read(cx, buf),
                    None => std::task::Poll::Ready(Ok(())),
                }
            }
        }
    }
}

/// Compose `<storageURL>[/container[/object]][?params]`
///
/// Container and object names are percent-encoded per path segment; an
/// object name's embedded `/` separates segments and so survives unescaped.
fn build_storage_url(
    storage_url: &str,
    container: Option<&str>,
    object_name: Option<&str>,
    parameters: &[(String, String)],
) -> Result<Url> {
    let mut url = Url::parse(storage_url)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::Auth(format!("storage URL cannot be a base: {storage_url}")))?;
        segments.pop_if_empty();
        if let Some(container) = container {
            segments.push(container);
            if let Some(object_name) = object_name {
                for part in object_name.split('/') {
                    segments.push(part);
                }
            }
        }
    }
    if !parameters.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in parameters {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Copy response headers into the canonicalizing map
fn headers_from_response(map: &reqwest::header::HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str(), value.to_string());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORAGE: &str = "https://storage.example.com/v1/AUTH_fred";

    #[test]
    fn test_build_url_account() {
        let url = build_storage_url(STORAGE, None, None, &[]).unwrap();
        assert_eq!(url.as_str(), STORAGE);
    }

    #[test]
    fn test_build_url_container_and_object() {
        let url = build_storage_url(STORAGE, Some("movies"), Some("holiday.mp4"), &[]).unwrap();
        assert_eq!(url.as_str(), format!("{STORAGE}/movies/holiday.mp4"));
    }

    #[test]
    fn test_build_url_preserves_object_slashes() {
        let url =
            build_storage_url(STORAGE, Some("c"), Some("dir/sub dir/file £.txt"), &[]).unwrap();
        assert_eq!(
            url.as_str(),
            format!("{STORAGE}/c/dir/sub%20dir/file%20%C2%A3.txt")
        );
    }

    #[test]
    fn test_build_url_escapes_container() {
        let url = build_storage_url(STORAGE, Some("my container"), None, &[]).unwrap();
        assert_eq!(url.as_str(), format!("{STORAGE}/my%20container"));
    }

    #[test]
    fn test_build_url_trailing_slash_object() {
        let url = build_storage_url(STORAGE, Some("c"), Some("dir/"), &[]).unwrap();
        assert_eq!(url.as_str(), format!("{STORAGE}/c/dir/"));
    }

    #[test]
    fn test_build_url_parameters() {
        let url = build_storage_url(
            STORAGE,
            Some("c"),
            None,
            &[
                ("format".to_string(), "json".to_string()),
                ("marker".to_string(), "a&b".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(url.as_str(), format!("{STORAGE}/c?format=json&marker=a%26b"));
    }

    #[test]
    fn test_build_url_storage_url_with_trailing_slash() {
        let url = build_storage_url(&format!("{STORAGE}/"), Some("c"), None, &[]).unwrap();
        assert_eq!(url.as_str(), format!("{STORAGE}/c"));
    }

    #[tokio::test]
    async fn test_builder_defaults() {
        let conn = ConnectionBuilder::new()
            .user_name("u")
            .api_key("k")
            .auth_url("https://auth.example.com/v1.0")
            .build()
            .unwrap();
        assert_eq!(conn.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(conn.user_agent(), DEFAULT_USER_AGENT);
        assert!(!conn.authenticated().await);
    }

    #[tokio::test]
    async fn test_set_storage_marks_authenticated() {
        let conn = ConnectionBuilder::new()
            .auth_url("https://auth.example.com/v1.0")
            .build()
            .unwrap();
        conn.set_storage(STORAGE, "token").await;
        assert!(conn.authenticated().await);
        assert_eq!(conn.storage_url().await.as_deref(), Some(STORAGE));

        conn.unauthenticate().await;
        assert!(!conn.authenticated().await);
        assert_eq!(conn.storage_url().await, None);
    }

    #[test]
    fn test_copy_method() {
        assert_eq!(copy_method().as_str(), "COPY");
    }
}
