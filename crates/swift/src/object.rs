//! Object operations
//!
//! Listings and metadata calls are thin wrappers over the pipeline. The two
//! stream types carry the integrity contract: [`ObjectOpenFile`] checks the
//! MD5 and length of what was read on close, [`ObjectCreateFile`] feeds a PUT
//! through a pipe and checks the server's Etag against the local hash when
//! the pipe closes.

use std::io;
use std::io::SeekFrom;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use md5::{Digest, Md5};
use reqwest::Method;
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};
use url::Url;

use sc_core::{
    container_error_map, object_error_map, Error, Headers, Object, ObjectType, ObjectsOpts,
    Result, DEFAULT_LISTING_LIMIT,
};

use crate::connection::{copy_method, CallResponse, Connection, RequestBody, RequestOpts};

/// Pipe capacity between an [`ObjectCreateFile`] writer and its PUT
const CREATE_PIPE_CAPACITY: usize = 64 * 1024;

/// Fallback when no content type is given and none can be guessed
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

impl Connection {
    /// Names of objects in the container
    pub async fn object_names(
        &self,
        container: &str,
        opts: Option<&ObjectsOpts>,
    ) -> Result<Vec<String>> {
        let (parameters, headers) = parse_opts(opts);
        let resp = self
            .call(RequestOpts {
                container: Some(container),
                operation: Method::GET,
                parameters,
                headers,
                error_map: Some(container_error_map),
                ..Default::default()
            })
            .await?;
        resp.body.lines().await
    }

    /// Objects in the container with full listing info
    ///
    /// If a delimiter is set the result may contain pseudo-directory entries
    /// with `pseudo_directory` set and content type `application/directory`.
    /// These represent common prefixes no real object was created for.
    pub async fn objects(
        &self,
        container: &str,
        opts: Option<&ObjectsOpts>,
    ) -> Result<Vec<Object>> {
        let (mut parameters, headers) = parse_opts(opts);
        parameters.push(("format".to_string(), "json".to_string()));
        let resp = self
            .call(RequestOpts {
                container: Some(container),
                operation: Method::GET,
                parameters,
                headers,
                error_map: Some(container_error_map),
                ..Default::default()
            })
            .await?;
        let mut objects: Vec<Object> = resp.body.json().await?;
        for object in &mut objects {
            object.normalize()?;
        }
        Ok(objects)
    }

    /// All objects in the container, following markers past the listing limit
    pub async fn objects_all(
        &self,
        container: &str,
        opts: Option<&ObjectsOpts>,
    ) -> Result<Vec<Object>> {
        let mut opts = all_opts(opts);
        let limit = opts.limit.unwrap_or(DEFAULT_LISTING_LIMIT);
        let mut objects: Vec<Object> = Vec::new();
        loop {
            let page = self.objects(container, Some(&opts)).await?;
            let short = (page.len() as u32) < limit;
            objects.extend(page);
            if short {
                break;
            }
            opts.marker = objects.last().map(|o| o.name.clone());
        }
        Ok(objects)
    }

    /// All object names in the container, following markers
    pub async fn object_names_all(
        &self,
        container: &str,
        opts: Option<&ObjectsOpts>,
    ) -> Result<Vec<String>> {
        let mut opts = all_opts(opts);
        let limit = opts.limit.unwrap_or(DEFAULT_LISTING_LIMIT);
        let mut names: Vec<String> = Vec::new();
        loop {
            let page = self.object_names(container, Some(&opts)).await?;
            let short = (page.len() as u32) < limit;
            names.extend(page);
            if short {
                break;
            }
            opts.marker = names.last().cloned();
        }
        Ok(names)
    }

    /// Info about a single object from a HEAD, with its headers
    ///
    /// May return `ObjectNotFound`. Use
    /// [`sc_core::Headers::object_metadata`] to read the metadata out of the
    /// headers.
    pub async fn object(&self, container: &str, object_name: &str) -> Result<(Object, Headers)> {
        let resp = self
            .call(RequestOpts {
                container: Some(container),
                object_name: Some(object_name),
                operation: Method::HEAD,
                error_map: Some(object_error_map),
                no_response: true,
                ..Default::default()
            })
            .await?;
        let headers = resp.headers;
        let server_last_modified = headers.get("Last-Modified").unwrap_or_default().to_string();
        let info = Object {
            name: object_name.to_string(),
            content_type: headers.get("Content-Type").unwrap_or_default().to_string(),
            bytes: headers.get_i64("Content-Length")?,
            last_modified: Some(sc_core::types::parse_http_time(&server_last_modified)?),
            server_last_modified,
            hash: headers.get("Etag").unwrap_or_default().to_string(),
            pseudo_directory: false,
            sub_dir: String::new(),
            object_type: if headers.is_large_object_slo() {
                ObjectType::StaticLargeObject
            } else if headers.is_large_object_dlo() {
                ObjectType::DynamicLargeObject
            } else {
                ObjectType::Normal
            },
        };
        Ok((info, headers))
    }

    /// Delete the object
    ///
    /// May return `ObjectNotFound`.
    pub async fn object_delete(&self, container: &str, object_name: &str) -> Result<()> {
        self.call(RequestOpts {
            container: Some(container),
            object_name: Some(object_name),
            operation: Method::DELETE,
            error_map: Some(object_error_map),
            no_response: true,
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    /// Add, replace or remove object metadata
    ///
    /// The POST replaces all metadata previously set on the object, so to
    /// delete keys just don't mention them. This is also the way to set
    /// headers not assigned yet, such as `X-Delete-At` or `X-Delete-After`
    /// for expiring objects. To change `Content-Type` or other non-metadata
    /// headers use [`Connection::object_copy`] onto self instead.
    pub async fn object_update(
        &self,
        container: &str,
        object_name: &str,
        headers: Headers,
    ) -> Result<()> {
        self.call(RequestOpts {
            container: Some(container),
            object_name: Some(object_name),
            operation: Method::POST,
            headers: Some(headers),
            error_map: Some(object_error_map),
            no_response: true,
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    /// Server-side copy of an object to a new position
    ///
    /// All metadata is preserved; metadata set in `headers` overrides the old
    /// metadata on the copied object. The destination container must exist.
    /// Copying an object onto itself is the only way to update its content
    /// type.
    pub async fn object_copy(
        &self,
        src_container: &str,
        src_object_name: &str,
        dst_container: &str,
        dst_object_name: &str,
        headers: Option<Headers>,
    ) -> Result<Headers> {
        let mut extra = Headers::new();
        extra.insert(
            "Destination",
            escaped_path(dst_container, dst_object_name)?,
        );
        if let Some(headers) = headers {
            extra.extend(&headers);
        }
        let resp = self
            .call(RequestOpts {
                container: Some(src_container),
                object_name: Some(src_object_name),
                operation: copy_method(),
                headers: Some(extra),
                error_map: Some(object_error_map),
                no_response: true,
                ..Default::default()
            })
            .await?;
        Ok(resp.headers)
    }

    /// Server-side move: copy then delete the source
    pub async fn object_move(
        &self,
        src_container: &str,
        src_object_name: &str,
        dst_container: &str,
        dst_object_name: &str,
    ) -> Result<()> {
        self.object_copy(
            src_container,
            src_object_name,
            dst_container,
            dst_object_name,
            None,
        )
        .await?;
        self.object_delete(src_container, src_object_name).await
    }

    /// Update the content type by copying the object onto itself
    pub async fn object_update_content_type(
        &self,
        container: &str,
        object_name: &str,
        content_type: &str,
    ) -> Result<()> {
        let headers = Headers::from([("Content-Type", content_type)]);
        self.object_copy(container, object_name, container, object_name, Some(headers))
            .await?;
        Ok(())
    }

    /// Create or update an object, returning a writer for its contents
    ///
    /// You must call [`ObjectCreateFile::close`] and check its error: the
    /// upload is only known to have worked then.
    ///
    /// With `check_hash` set the MD5 is computed as data is written and
    /// compared against the server's Etag on close, failing with
    /// `ObjectCorrupted` on mismatch. If the MD5 is known ahead of time pass
    /// it in `hash` instead and the server does the checking.
    pub async fn object_create<'a>(
        &'a self,
        container: &str,
        object_name: &str,
        check_hash: bool,
        hash: &str,
        content_type: &str,
        headers: Option<Headers>,
    ) -> Result<ObjectCreateFile<'a>> {
        let mut check_hash = check_hash;
        let extra = object_put_headers(object_name, &mut check_hash, hash, content_type, headers);

        let (near, far) = tokio::io::duplex(CREATE_PIPE_CAPACITY);
        let container = container.to_string();
        let object_name = object_name.to_string();
        let fut: BoxFuture<'a, Result<CallResponse>> = Box::pin(async move {
            self.call(RequestOpts {
                container: Some(&container),
                object_name: Some(&object_name),
                operation: Method::PUT,
                headers: Some(extra),
                error_map: Some(object_error_map),
                no_response: true,
                body: Some(RequestBody::Reader(Box::new(far))),
                ..Default::default()
            })
            .await
        });

        Ok(ObjectCreateFile {
            writer: Some(near),
            fut: Some(fut),
            outcome: None,
            check_hash,
            hasher: check_hash.then(Md5::new),
            headers: None,
            closed: false,
        })
    }

    /// Create or update an object from a reader
    ///
    /// This is a low level interface; the reader is streamed into a single
    /// PUT. Hash handling is as for [`Connection::object_create`]. Returns
    /// the response headers.
    pub async fn object_put(
        &self,
        container: &str,
        object_name: &str,
        contents: impl AsyncRead + Send + Unpin + 'static,
        check_hash: bool,
        hash: &str,
        content_type: &str,
        headers: Option<Headers>,
    ) -> Result<Headers> {
        let mut check_hash = check_hash;
        let extra = object_put_headers(object_name, &mut check_hash, hash, content_type, headers);

        let hasher = Arc::new(StdMutex::new(Md5::new()));
        let body: Box<dyn AsyncRead + Send + Unpin> = if check_hash {
            Box::new(HashingReader {
                inner: contents,
                hasher: hasher.clone(),
            })
        } else {
            Box::new(contents)
        };

        let resp = self
            .call(RequestOpts {
                container: Some(container),
                object_name: Some(object_name),
                operation: Method::PUT,
                headers: Some(extra),
                error_map: Some(object_error_map),
                no_response: true,
                body: Some(RequestBody::Reader(body)),
                ..Default::default()
            })
            .await?;

        if check_hash {
            let local = finalize_hex(&hasher)?;
            if !etag_matches(resp.headers.get("Etag"), &local) {
                return Err(Error::ObjectCorrupted);
            }
        }
        Ok(resp.headers)
    }

    /// Create an object from a byte slice, with the MD5 checked by the server
    pub async fn object_put_bytes(
        &self,
        container: &str,
        object_name: &str,
        contents: impl Into<Bytes>,
        content_type: &str,
    ) -> Result<()> {
        self.object_put_bytes_opts(
            container,
            object_name,
            contents.into(),
            true,
            "",
            content_type,
            None,
            Vec::new(),
            object_error_map,
        )
        .await?;
        Ok(())
    }

    /// Create an object from a string, with the MD5 checked by the server
    pub async fn object_put_string(
        &self,
        container: &str,
        object_name: &str,
        contents: impl Into<String>,
        content_type: &str,
    ) -> Result<()> {
        self.object_put_bytes(
            container,
            object_name,
            Bytes::from(contents.into()),
            content_type,
        )
        .await
    }

    /// In-memory PUT used by the convenience calls and the large-object
    /// engine. The body replays freely on reauthentication; with
    /// `check_hash` set and no caller hash the MD5 is computed here and sent
    /// as the Etag for the server to verify.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn object_put_bytes_opts(
        &self,
        container: &str,
        object_name: &str,
        contents: Bytes,
        check_hash: bool,
        hash: &str,
        content_type: &str,
        headers: Option<Headers>,
        parameters: Vec<(String, String)>,
        error_map: sc_core::ErrorMap,
    ) -> Result<Headers> {
        let mut check_hash = check_hash;
        let mut extra = object_put_headers(object_name, &mut check_hash, hash, content_type, headers);
        if check_hash {
            extra.insert("Etag", hex::encode(Md5::digest(&contents)));
        }
        let resp = self
            .call(RequestOpts {
                container: Some(container),
                object_name: Some(object_name),
                operation: Method::PUT,
                parameters,
                headers: Some(extra),
                error_map: Some(error_map),
                no_response: true,
                body: Some(RequestBody::Bytes(contents)),
                ..Default::default()
            })
            .await?;
        Ok(resp.headers)
    }

    /// Open an object for reading, returning the reader and the response
    /// headers
    ///
    /// With `check_hash` set the MD5 of everything read is checked against
    /// the server's Etag on [`ObjectOpenFile::close`], along with the length;
    /// no checking happens unless the whole object was read without seeking.
    pub async fn object_open<'a>(
        &'a self,
        container: &str,
        object_name: &str,
        check_hash: bool,
        headers: Option<Headers>,
    ) -> Result<(ObjectOpenFile<'a>, Headers)> {
        self.object_open_with(container, object_name, check_hash, headers, Vec::new())
            .await
    }

    /// `object_open` with extra query parameters (`multipart-manifest=get`)
    pub(crate) async fn object_open_with<'a>(
        &'a self,
        container: &str,
        object_name: &str,
        check_hash: bool,
        headers: Option<Headers>,
        parameters: Vec<(String, String)>,
    ) -> Result<(ObjectOpenFile<'a>, Headers)> {
        let resp = self
            .call(RequestOpts {
                container: Some(container),
                object_name: Some(object_name),
                operation: Method::GET,
                parameters,
                headers: headers.clone(),
                error_map: Some(object_error_map),
                ..Default::default()
            })
            .await?;
        let length = resp.headers.get_i64("Content-Length").ok().map(|n| n as u64);
        let file = ObjectOpenFile {
            conn: self,
            container: container.to_string(),
            object_name: object_name.to_string(),
            req_headers: headers.unwrap_or_default(),
            body: ObjectBody::Stream(resp.body),
            resp_headers: resp.headers.clone(),
            check_hash,
            hasher: check_hash.then(Md5::new),
            bytes_read: 0,
            pos: 0,
            length,
            eof: false,
            seeked: false,
        };
        Ok((file, resp.headers))
    }

    /// Fetch a whole object with its MD5 checked
    pub async fn object_get_bytes(&self, container: &str, object_name: &str) -> Result<Vec<u8>> {
        let (mut file, _) = self.object_open(container, object_name, true, None).await?;
        let mut contents = Vec::new();
        let read = file.read_to_end(&mut contents).await;
        let close = file.close().await;
        read?;
        close?;
        Ok(contents)
    }

    /// Fetch a whole object as a string with its MD5 checked
    pub async fn object_get_string(&self, container: &str, object_name: &str) -> Result<String> {
        let bytes = self.object_get_bytes(container, object_name).await?;
        String::from_utf8(bytes)
            .map_err(|_| Error::Unsupported("object contents are not valid UTF-8".to_string()))
    }
}

fn parse_opts(opts: Option<&ObjectsOpts>) -> (Vec<(String, String)>, Option<Headers>) {
    match opts {
        Some(opts) => (opts.parse(), opts.headers.clone()),
        None => (Vec::new(), None),
    }
}

fn all_opts(opts: Option<&ObjectsOpts>) -> ObjectsOpts {
    let mut opts = opts.cloned().unwrap_or_default();
    if opts.limit.unwrap_or(0) == 0 {
        opts.limit = Some(DEFAULT_LISTING_LIMIT);
    }
    opts.marker = None;
    opts
}

/// Headers for a PUT: content type from the caller, else guessed from the
/// object name's extension; a caller-supplied hash rides as the Etag and
/// turns client-side hashing off since the server will verify it.
fn object_put_headers(
    object_name: &str,
    check_hash: &mut bool,
    hash: &str,
    content_type: &str,
    headers: Option<Headers>,
) -> Headers {
    let content_type = if content_type.is_empty() {
        mime_guess::from_path(object_name)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    } else {
        content_type
    };
    let mut extra = Headers::new();
    extra.insert("Content-Type", content_type.to_string());
    if let Some(headers) = headers {
        extra.extend(&headers);
    }
    if !hash.is_empty() {
        extra.insert("Etag", hash.to_string());
        // The server checks the hash for us
        *check_hash = false;
    }
    extra
}

/// `container/object` percent-encoded the same way as request URLs, for the
/// `Destination` header and bulk-delete bodies where difficult names must
/// survive as header or body text.
pub(crate) fn escaped_path(container: &str, object_name: &str) -> Result<String> {
    let mut url = Url::parse("https://copy.invalid")?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::Unsupported("cannot build destination".to_string()))?;
        segments.push(container);
        for part in object_name.split('/') {
            segments.push(part);
        }
    }
    Ok(url.path().trim_start_matches('/').to_string())
}

fn etag_matches(server: Option<&str>, local_hex: &str) -> bool {
    match server {
        Some(etag) => etag.trim_matches('"').eq_ignore_ascii_case(local_hex),
        None => false,
    }
}

fn finalize_hex(hasher: &Arc<StdMutex<Md5>>) -> Result<String> {
    let hasher = hasher
        .lock()
        .map_err(|_| Error::Unsupported("hash state poisoned".to_string()))?;
    Ok(hex::encode(hasher.clone().finalize()))
}

/// An `AsyncRead` which folds everything it reads into a shared MD5
struct HashingReader<R> {
    inner: R,
    hasher: Arc<StdMutex<Md5>>,
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let new = &buf.filled()[start..];
        if !new.is_empty() {
            if let Ok(mut hasher) = this.hasher.lock() {
                hasher.update(new);
            }
        }
        Poll::Ready(Ok(()))
    }
}

enum ObjectBody {
    Stream(crate::connection::ResponseBody),
    /// Positioned at end-of-object; reads yield EOF without a request
    Empty,
}

/// An object open for reading
///
/// Supports sequential reads plus seeking; a seek reopens the object with a
/// `Range` header and disables hash checking for the remainder.
pub struct ObjectOpenFile<'a> {
    conn: &'a Connection,
    container: String,
    object_name: String,
    req_headers: Headers,
    body: ObjectBody,
    resp_headers: Headers,
    check_hash: bool,
    hasher: Option<Md5>,
    bytes_read: u64,
    pos: u64,
    length: Option<u64>,
    eof: bool,
    seeked: bool,
}

impl<'a> ObjectOpenFile<'a> {
    /// Read up to `buf.len()` bytes, returning 0 at end of object
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match &mut self.body {
            ObjectBody::Stream(stream) => {
                use tokio::io::AsyncReadExt;
                stream.read(buf).await?
            }
            ObjectBody::Empty => 0,
        };
        if n == 0 {
            self.eof = true;
        } else {
            if let Some(hasher) = &mut self.hasher {
                hasher.update(&buf[..n]);
            }
            self.bytes_read += n as u64;
            self.pos += n as u64;
        }
        Ok(n)
    }

    /// Read until end of object, appending to `out`
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    /// Move the read position
    ///
    /// Seeking reopens the object over HTTP with a `Range` header, so it
    /// disables the close-time hash check. Seeking relative to the end needs
    /// the object length; seeking past the end is not expressible as a Range
    /// request and is refused.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
            SeekFrom::End(offset) => {
                let length = self.length.ok_or_else(|| {
                    Error::Unsupported(
                        "length of object unknown so can't seek from end".to_string(),
                    )
                })?;
                length as i64 + offset
            }
        };
        if new_pos < 0 {
            return Err(Error::Unsupported("negative seek position".to_string()));
        }
        let new_pos = new_pos as u64;
        if let Some(length) = self.length {
            if new_pos > length {
                return Err(Error::Unsupported(
                    "can't seek past the end of an object".to_string(),
                ));
            }
        }
        // Already there (quite likely), do nothing
        if new_pos == self.pos {
            return Ok(self.pos);
        }

        self.seeked = true;
        self.check_hash = false;
        self.hasher = None;

        if Some(new_pos) == self.length {
            // HTTP ranges cannot address the position exactly at the end;
            // there is nothing left to read from there anyway
            self.body = ObjectBody::Empty;
            self.pos = new_pos;
            self.eof = true;
            return Ok(self.pos);
        }

        let mut headers = self.req_headers.clone();
        if new_pos > 0 {
            headers.insert("Range", format!("bytes={new_pos}-"));
        } else {
            headers.remove("Range");
        }
        let (file, _) = self
            .conn
            .object_open(&self.container, &self.object_name, false, Some(headers))
            .await?;
        self.body = file.body;
        self.resp_headers = file.resp_headers;
        self.pos = new_pos;
        self.eof = false;
        Ok(self.pos)
    }

    /// Length of the object
    ///
    /// Uses the `Content-Length` seen at open when available; otherwise asks
    /// the server with a zero-byte range and parses the `Content-Range`
    /// total. The result is cached.
    pub async fn length(&mut self) -> Result<u64> {
        if let Some(length) = self.length {
            return Ok(length);
        }
        let mut headers = self.req_headers.clone();
        headers.insert("Range", "bytes=0-0".to_string());
        let resp = self
            .conn
            .call(RequestOpts {
                container: Some(&self.container),
                object_name: Some(&self.object_name),
                operation: Method::GET,
                headers: Some(headers),
                error_map: Some(object_error_map),
                no_response: true,
                ..Default::default()
            })
            .await?;
        let content_range = resp
            .headers
            .get("Content-Range")
            .ok_or_else(|| Error::bad_header("Content-Range", "missing"))?;
        let total = parse_content_range_total(content_range)
            .ok_or_else(|| Error::bad_header("Content-Range", content_range.to_string()))?;
        self.length = Some(total);
        Ok(total)
    }

    /// Headers of the most recent response backing this reader
    pub fn headers(&self) -> &Headers {
        &self.resp_headers
    }

    /// Close the reader, verifying hash and length when the whole object was
    /// read without seeking
    pub async fn close(&mut self) -> Result<()> {
        // Dropping the body closes the connection
        let body = std::mem::replace(&mut self.body, ObjectBody::Empty);
        drop(body);

        if !self.eof || self.seeked {
            return Ok(());
        }
        if self.check_hash {
            if let Some(hasher) = self.hasher.take() {
                let local = hex::encode(hasher.finalize());
                if !etag_matches(self.resp_headers.get("Etag"), &local) {
                    return Err(Error::ObjectCorrupted);
                }
            }
        }
        if let Some(length) = self.length {
            if length != self.bytes_read {
                return Err(Error::ObjectCorrupted);
            }
        }
        Ok(())
    }
}

/// An object open for writing through a pipe
///
/// Data written here streams into a PUT; the request future is polled from
/// [`ObjectCreateFile::write`] and [`ObjectCreateFile::close`], so no extra
/// task is needed. `close` must be called and its error checked.
pub struct ObjectCreateFile<'a> {
    writer: Option<DuplexStream>,
    fut: Option<BoxFuture<'a, Result<CallResponse>>>,
    outcome: Option<Result<Headers>>,
    check_hash: bool,
    hasher: Option<Md5>,
    headers: Option<Headers>,
    closed: bool,
}

enum WriteStep {
    RequestDone(Result<CallResponse>),
    Wrote(io::Result<()>),
}

impl<'a> ObjectCreateFile<'a> {
    /// Write bytes into the object
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::Unsupported("write on closed object".to_string()));
        }
        if self.outcome.is_some() {
            // The request ended early; surface what happened
            return self.take_outcome_error();
        }
        if let Some(hasher) = &mut self.hasher {
            hasher.update(buf);
        }

        let step = {
            let fut = match &mut self.fut {
                Some(fut) => fut,
                None => return Err(Error::Unsupported("upload aborted".to_string())),
            };
            let writer = match &mut self.writer {
                Some(writer) => writer,
                None => return Err(Error::Unsupported("write on closed object".to_string())),
            };
            tokio::select! {
                biased;
                res = &mut *fut => WriteStep::RequestDone(res),
                res = writer.write_all(buf) => WriteStep::Wrote(res),
            }
        };

        match step {
            WriteStep::RequestDone(res) => {
                self.fut = None;
                self.writer = None;
                match res {
                    Ok(resp) => {
                        self.outcome = Some(Ok(resp.headers));
                        Err(Error::Unsupported(
                            "upload already finished".to_string(),
                        ))
                    }
                    Err(err) => {
                        self.outcome =
                            Some(Err(Error::Unsupported("upload failed".to_string())));
                        Err(err)
                    }
                }
            }
            WriteStep::Wrote(res) => {
                res?;
                Ok(buf.len())
            }
        }
    }

    /// Close the pipe, wait for the PUT to finish and verify the hash
    ///
    /// Errors from the request dominate local hashing errors.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Closing the write half signals EOF to the request body
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        if self.outcome.is_none() {
            if let Some(fut) = self.fut.take() {
                self.outcome = Some(fut.await.map(|resp| resp.headers));
            }
        }

        let headers = match self.outcome.take() {
            Some(Ok(headers)) => headers,
            Some(Err(err)) => return Err(err),
            None => return Err(Error::Unsupported("upload aborted".to_string())),
        };

        if self.check_hash {
            if let Some(hasher) = self.hasher.take() {
                let local = hex::encode(hasher.finalize());
                if !etag_matches(headers.get("Etag"), &local) {
                    self.headers = Some(headers);
                    return Err(Error::ObjectCorrupted);
                }
            }
        }
        self.headers = Some(headers);
        Ok(())
    }

    /// Abort the upload, abandoning the request
    ///
    /// The object may or may not exist on the server afterwards. Idempotent;
    /// always succeeds.
    pub fn close_with_error(&mut self, _err: Error) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Dropping the in-flight request cancels the PUT mid-body, so the
        // server never sees a complete upload
        self.fut = None;
        self.writer = None;
        self.outcome = None;
    }

    /// Response headers, available after a successful close
    pub fn headers(&self) -> Result<&Headers> {
        self.headers
            .as_ref()
            .ok_or_else(|| Error::Unsupported("headers not available until close".to_string()))
    }

    fn take_outcome_error(&mut self) -> Result<usize> {
        match self.outcome.take() {
            Some(Err(err)) => {
                self.outcome = Some(Err(Error::Unsupported("upload failed".to_string())));
                Err(err)
            }
            Some(Ok(headers)) => {
                self.outcome = Some(Ok(headers));
                Err(Error::Unsupported("upload already finished".to_string()))
            }
            None => Err(Error::Unsupported("upload failed".to_string())),
        }
    }
}

/// Parse the total out of `Content-Range: bytes <a>-<b>/<total>`
fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim();
    rest.split('/').nth(1)?.trim().parse().ok()
}
