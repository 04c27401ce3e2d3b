//! Large object engine
//!
//! A logical object bigger than the server's single-object limit is stored
//! as an ordered run of segment objects plus a manifest: dynamic manifests
//! ([`crate::Connection::dynamic_large_object_create`]) reference every
//! object under a name prefix, static manifests
//! ([`crate::Connection::static_large_object_create`]) pin an explicit
//! segment list with sizes and hashes.
//!
//! The write path rewrites only the segments a write touches. Interior
//! segments keep their old sizes so the segments after them stay valid;
//! only the final segment of the object may grow. Reads of old data go to
//! the segment objects directly, never through the manifest, so nothing
//! here depends on listing consistency mid-write.

mod buffer;
mod dlo;
mod slo;

pub use buffer::BufferedLargeObjectFile;
pub use dlo::DynamicLargeObjectCreateFile;
pub use slo::StaticLargeObjectCreateFile;

use std::io::SeekFrom;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use rand::RngCore;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use sc_core::{container_error_map, object_error_map, Error, Headers, Result};

use crate::connection::{Connection, RequestBody, RequestOpts};

/// Default maximum size of a stored segment
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// How long to wait for a freshly flushed object to reach its full size
const FLUSH_WAIT_BUDGET: Duration = Duration::from_secs(15);

/// First delay of the post-flush polling loop
const FLUSH_WAIT_INITIAL: Duration = Duration::from_millis(200);

/// Options for opening a large object for writing
#[derive(Debug, Clone, Default)]
pub struct LargeObjectOpts {
    /// Name of the container to place the object in
    pub container: String,

    /// Name of the object
    pub object_name: String,

    /// Remove any existing contents on open
    pub truncate: bool,

    /// Position the write cursor at the current end
    pub append: bool,

    /// Send a locally computed MD5 with each segment so the server verifies
    /// the upload
    pub check_hash: bool,

    /// Content type of the object; guessed from the name when empty
    pub content_type: String,

    /// Additional headers to upload the manifest with
    pub headers: Option<Headers>,

    /// Maximum size of stored segments; defaults to 10 MiB
    pub chunk_size: u64,

    /// Segments smaller than this are grown before new ones start
    /// (static large objects only; raised to the server's minimum)
    pub min_chunk_size: u64,

    /// Name of the container to place segments in; defaults to the
    /// segment container of an existing manifest, else `<container>_segments`
    pub segment_container: String,

    /// Prefix to use for the segments; defaults to the prefix of an
    /// existing manifest, else a fresh random one
    pub segment_prefix: String,

    /// Don't coalesce small writes into chunk-sized buffers
    pub no_buffer: bool,
}

/// One stored segment of a large object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Object name within the segment container
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// MD5 hex hash
    pub hash: String,
}

/// An open large object: write, seek, flush the manifest, close
///
/// Returned by the dynamic and static create calls, usually wrapped in the
/// buffering layer. After [`LargeObjectFile::close`] the handle is dead.
#[async_trait]
pub trait LargeObjectFile: Send {
    /// Write bytes at the current position
    async fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Set the position for the next write
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Write the manifest and wait for the object to reach its full size
    async fn flush(&mut self) -> Result<()>;

    /// Flush and finish
    async fn close(&mut self) -> Result<()>;

    /// Total logical size of the object
    fn size(&self) -> u64;
}

/// Wrap a file in the write-coalescing buffer unless the caller opted out
pub(crate) fn with_buffer<'a>(
    opts: &LargeObjectOpts,
    inner: Box<dyn LargeObjectFile + 'a>,
) -> Box<dyn LargeObjectFile + 'a> {
    if opts.no_buffer {
        inner
    } else {
        let chunk_size = effective_chunk_size(opts.chunk_size);
        Box::new(BufferedLargeObjectFile::new(inner, chunk_size as usize))
    }
}

pub(crate) fn effective_chunk_size(chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

/// `container/prefix` → (container, prefix)
pub(crate) fn parse_full_path(manifest: &str) -> (String, String) {
    match manifest.split_once('/') {
        Some((container, prefix)) => (container.to_string(), prefix.to_string()),
        None => (manifest.to_string(), String::new()),
    }
}

/// Name of segment `part_number` under `prefix`
pub(crate) fn segment_name(prefix: &str, part_number: usize) -> String {
    format!("{prefix}/{part_number:016}")
}

/// The prefix directory of a segment name
pub(crate) fn segment_dir(name: &str) -> String {
    match name.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

/// A fresh random segment prefix: `segments/<hex[..3]>/<hex[3..]>` of the
/// SHA-1 over the object name followed by 256 random bits.
pub(crate) fn generate_segment_path(object_name: &str) -> String {
    let mut random = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random);
    let mut hasher = Sha1::new();
    hasher.update(object_name.as_bytes());
    hasher.update(random);
    let digest = hex::encode(hasher.finalize());
    format!("segments/{}/{}", &digest[..3], &digest[3..])
}

/// Status map for the static manifest PUT: the server answers 400 when a
/// segment's size or hash doesn't match the manifest
fn slo_manifest_error_map(status: u16) -> Option<Error> {
    match status {
        400 => Some(Error::ObjectCorrupted),
        _ => object_error_map(status),
    }
}

/// Manifest entry uploaded with `multipart-manifest=put`
#[derive(Debug, Serialize)]
pub(crate) struct SloManifestEntry {
    path: String,
    etag: String,
    size_bytes: u64,
}

/// Manifest entry as returned by `multipart-manifest=get`
#[derive(Debug, Default, Deserialize)]
struct SloSegmentListing {
    #[serde(default)]
    name: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    bytes: u64,
}

/// Result of a bulk delete
#[derive(Debug, Default, Deserialize)]
pub struct BulkDeleteResult {
    /// Number of objects deleted
    #[serde(rename = "Number Deleted", default)]
    pub number_deleted: i64,
    /// Number of objects the server could not find; normal under eventual
    /// consistency
    #[serde(rename = "Number Not Found", default)]
    pub number_not_found: i64,
    /// Per-object failures as `(path, status)` pairs
    #[serde(rename = "Errors", default)]
    pub errors: Vec<(String, String)>,
}

impl Connection {
    /// Open a large object for writing, shared by both manifest flavors
    pub(crate) async fn large_object_create<'a>(
        &'a self,
        opts: &LargeObjectOpts,
        slo: bool,
    ) -> Result<LargeObjectCore<'a>> {
        let chunk_size = effective_chunk_size(opts.chunk_size);
        let mut segment_container = if opts.segment_container.is_empty() {
            format!("{}_segments", opts.container)
        } else {
            opts.segment_container.clone()
        };
        let mut prefix = opts.segment_prefix.clone();
        let mut segments: Vec<SegmentInfo> = Vec::new();
        let mut current_length: u64 = 0;

        match self.object(&opts.container, &opts.object_name).await {
            Ok((info, headers)) => {
                if headers.is_large_object() {
                    let (inherited_container, existing) = self
                        .get_all_segments(&opts.container, &opts.object_name, &headers)
                        .await?;
                    if !inherited_container.is_empty() {
                        segment_container = inherited_container;
                    }
                    if let Some(first) = existing.first() {
                        prefix = segment_dir(&first.name);
                    }
                    if opts.truncate {
                        self.large_object_delete(&opts.container, &opts.object_name)
                            .await?;
                    } else {
                        current_length = existing.iter().map(|s| s.size).sum();
                        segments = existing;
                    }
                } else if opts.truncate {
                    self.object_delete(&opts.container, &opts.object_name).await?;
                } else {
                    // A plain object becomes segment 1 so appends can extend it
                    if prefix.is_empty() {
                        prefix = generate_segment_path(&opts.object_name);
                    }
                    let first = segment_name(&prefix, 1);
                    self.object_move(
                        &opts.container,
                        &opts.object_name,
                        &segment_container,
                        &first,
                    )
                    .await?;
                    current_length = info.bytes as u64;
                    segments.push(SegmentInfo {
                        name: first,
                        size: info.bytes as u64,
                        hash: info.hash.trim_matches('"').to_lowercase(),
                    });
                }
            }
            Err(Error::ObjectNotFound) => {}
            Err(e) => return Err(e),
        }

        if prefix.is_empty() {
            prefix = generate_segment_path(&opts.object_name);
        }

        Ok(LargeObjectCore {
            conn: self,
            container: opts.container.clone(),
            object_name: opts.object_name.clone(),
            content_type: opts.content_type.clone(),
            headers: opts.headers.clone().unwrap_or_default(),
            segment_container,
            prefix,
            chunk_size,
            min_chunk_size: if slo { opts.min_chunk_size } else { 0 },
            slo,
            check_hash: opts.check_hash,
            file_pos: if opts.append { current_length } else { 0 },
            current_length,
            segments,
        })
    }

    /// Delete a large object and every segment it references
    ///
    /// The manifest goes first so no reader can observe a manifest pointing
    /// at half-deleted segments. Uses the bulk middleware when the server
    /// advertises it.
    pub async fn large_object_delete(&self, container: &str, object_name: &str) -> Result<()> {
        let (_, headers) = self.object(container, object_name).await?;
        let mut paths: Vec<(String, String)> =
            vec![(container.to_string(), object_name.to_string())];
        if headers.is_large_object() {
            let (segment_container, segments) = self
                .get_all_segments(container, object_name, &headers)
                .await?;
            paths.extend(
                segments
                    .into_iter()
                    .map(|s| (segment_container.clone(), s.name)),
            );
        }

        let bulk = match self.cached_query_info().await {
            Ok(info) => info.supports_bulk_delete(),
            Err(_) => false,
        };
        if bulk && paths.len() > 1 {
            match self.bulk_delete_paths(&paths).await {
                Ok(_) => return Ok(()),
                // Eventual consistency makes these normal
                Err(Error::Forbidden) | Err(Error::ObjectNotFound) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        for (container, name) in &paths {
            match self.object_delete(container, name).await {
                Ok(()) => {}
                Err(Error::ObjectNotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// The segments composing a large object
    ///
    /// For a dynamic manifest these are the objects under the manifest's
    /// prefix; for a static manifest the entries of its segment list.
    /// Returns the segment container and the segments in order. A plain
    /// object yields `NotLargeObject`.
    pub async fn large_object_get_segments(
        &self,
        container: &str,
        object_name: &str,
    ) -> Result<(String, Vec<SegmentInfo>)> {
        let (_, headers) = self.object(container, object_name).await?;
        if !headers.is_large_object() {
            return Err(Error::NotLargeObject);
        }
        self.get_all_segments(container, object_name, &headers).await
    }

    /// Enumerate segments from the manifest headers
    pub(crate) async fn get_all_segments(
        &self,
        container: &str,
        object_name: &str,
        headers: &Headers,
    ) -> Result<(String, Vec<SegmentInfo>)> {
        if let Some(manifest) = headers.get("X-Object-Manifest") {
            let (segment_container, segment_prefix) = parse_full_path(manifest);
            let segments = self
                .dlo_segments_reconciled(&segment_container, &segment_prefix)
                .await?;
            return Ok((segment_container, segments));
        }
        if headers.is_large_object_slo() {
            let (mut file, _) = self
                .object_open_with(
                    container,
                    object_name,
                    false,
                    None,
                    vec![("multipart-manifest".to_string(), "get".to_string())],
                )
                .await?;
            let mut raw = Vec::new();
            file.read_to_end(&mut raw).await?;
            file.close().await?;
            let listing: Vec<SloSegmentListing> = serde_json::from_slice(&raw)?;
            let mut segment_container = String::new();
            let mut segments = Vec::with_capacity(listing.len());
            for entry in listing {
                let (this_container, path) =
                    parse_full_path(entry.name.trim_start_matches('/'));
                segment_container = this_container;
                segments.push(SegmentInfo {
                    name: path,
                    size: entry.bytes,
                    hash: entry.hash.trim_matches('"').to_lowercase(),
                });
            }
            return Ok((segment_container, segments));
        }
        Err(Error::NotLargeObject)
    }

    /// List the segments under a prefix, then reconcile against listing lag:
    /// walk part numbers in order and HEAD every name the listing missed.
    /// HEAD is consistent even when the listing is stale; the first genuine
    /// 404 ends the object, since segments are written in order.
    async fn dlo_segments_reconciled(
        &self,
        segment_container: &str,
        segment_prefix: &str,
    ) -> Result<Vec<SegmentInfo>> {
        let opts = sc_core::ObjectsOpts {
            prefix: Some(segment_prefix.to_string()),
            ..Default::default()
        };
        let listed = self.objects_all(segment_container, Some(&opts)).await?;

        let numbered = listed
            .iter()
            .all(|o| is_segment_name(&o.name, segment_prefix));
        if !listed.is_empty() && !numbered {
            // Foreign naming scheme: trust the listing order
            return Ok(listed
                .into_iter()
                .map(|o| SegmentInfo {
                    name: o.name,
                    size: o.bytes as u64,
                    hash: o.hash.trim_matches('"').to_lowercase(),
                })
                .collect());
        }

        let mut by_name: std::collections::BTreeMap<String, &sc_core::Object> =
            listed.iter().map(|o| (o.name.clone(), o)).collect();
        let mut segments = Vec::new();
        for part_number in 1.. {
            let name = segment_name(segment_prefix, part_number);
            if let Some(object) = by_name.remove(&name) {
                segments.push(SegmentInfo {
                    name,
                    size: object.bytes as u64,
                    hash: object.hash.trim_matches('"').to_lowercase(),
                });
                continue;
            }
            match self.object(segment_container, &name).await {
                Ok((info, _)) => {
                    tracing::debug!(name = %name, "segment missing from listing, found by HEAD");
                    segments.push(SegmentInfo {
                        name,
                        size: info.bytes as u64,
                        hash: info.hash.trim_matches('"').to_lowercase(),
                    });
                }
                Err(Error::ObjectNotFound) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(segments)
    }

    /// PUT a zero-byte dynamic manifest pointing at `container/prefix`
    pub(crate) async fn create_dlo_manifest(
        &self,
        container: &str,
        object_name: &str,
        manifest: &str,
        content_type: &str,
        headers: Option<Headers>,
    ) -> Result<()> {
        let mut extra = headers.unwrap_or_default();
        extra.insert("X-Object-Manifest", manifest.to_string());
        self.object_put_bytes_opts(
            container,
            object_name,
            Bytes::new(),
            false,
            "",
            content_type,
            Some(extra),
            Vec::new(),
            object_error_map,
        )
        .await?;
        Ok(())
    }

    /// PUT a static manifest listing `segments` in order
    ///
    /// The server re-checks every entry's size and hash; a mismatch
    /// surfaces as `ObjectCorrupted`.
    pub(crate) async fn create_slo_manifest(
        &self,
        container: &str,
        object_name: &str,
        content_type: &str,
        segment_container: &str,
        segments: &[SegmentInfo],
        headers: Option<Headers>,
    ) -> Result<()> {
        let manifest: Vec<SloManifestEntry> = segments
            .iter()
            .map(|s| SloManifestEntry {
                path: format!("{segment_container}/{}", s.name),
                etag: s.hash.clone(),
                size_bytes: s.size,
            })
            .collect();
        let body = serde_json::to_vec(&manifest)?;
        self.object_put_bytes_opts(
            container,
            object_name,
            Bytes::from(body),
            false,
            "",
            content_type,
            headers,
            vec![("multipart-manifest".to_string(), "put".to_string())],
            slo_manifest_error_map,
        )
        .await?;
        Ok(())
    }

    /// Poll until a HEAD of the object reports `size` bytes
    ///
    /// Segment listings and manifest composition are eventually consistent;
    /// this loop turns that into a read-after-write guarantee at the
    /// library boundary.
    pub(crate) async fn wait_for_object_size(
        &self,
        container: &str,
        object_name: &str,
        size: u64,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + FLUSH_WAIT_BUDGET;
        let mut delay = FLUSH_WAIT_INITIAL;
        loop {
            match self.object(container, object_name).await {
                Ok((info, _)) if info.bytes as u64 == size => return Ok(()),
                Ok((info, _)) => {
                    tracing::debug!(
                        have = info.bytes,
                        want = size,
                        "large object not fully visible yet"
                    );
                }
                Err(Error::ObjectNotFound) => {}
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(container, object_name, "large object never reached its size");
                return Err(Error::Timeout);
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    /// Delete many objects in one request through the bulk middleware
    ///
    /// Returns the server's accounting of what was deleted; names the
    /// server could not find are counted, not errored.
    pub async fn bulk_delete(
        &self,
        container: &str,
        object_names: &[String],
    ) -> Result<BulkDeleteResult> {
        let paths: Vec<(String, String)> = object_names
            .iter()
            .map(|name| (container.to_string(), name.clone()))
            .collect();
        self.bulk_delete_paths(&paths).await
    }

    pub(crate) async fn bulk_delete_paths(
        &self,
        paths: &[(String, String)],
    ) -> Result<BulkDeleteResult> {
        let mut body = String::new();
        for (container, name) in paths {
            body.push('/');
            body.push_str(&crate::object::escaped_path(container, name)?);
            body.push('\n');
        }
        let headers = Headers::from([
            ("Content-Type", "text/plain"),
            ("Accept", "application/json"),
        ]);
        let resp = self
            .call(RequestOpts {
                operation: Method::POST,
                parameters: vec![("bulk-delete".to_string(), "true".to_string())],
                headers: Some(headers),
                error_map: Some(container_error_map),
                body: Some(RequestBody::Bytes(Bytes::from(body))),
                ..Default::default()
            })
            .await?;
        resp.body.json().await
    }
}

fn is_segment_name(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|part| part.len() == 16 && part.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Shared state and the write algorithm behind both manifest flavors
pub(crate) struct LargeObjectCore<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) container: String,
    pub(crate) object_name: String,
    pub(crate) content_type: String,
    pub(crate) headers: Headers,
    pub(crate) segment_container: String,
    pub(crate) prefix: String,
    chunk_size: u64,
    min_chunk_size: u64,
    slo: bool,
    check_hash: bool,
    file_pos: u64,
    current_length: u64,
    pub(crate) segments: Vec<SegmentInfo>,
}

impl<'a> LargeObjectCore<'a> {
    pub(crate) fn size(&self) -> u64 {
        self.current_length
    }

    pub(crate) fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.file_pos as i64 + offset,
            SeekFrom::End(offset) => self.current_length as i64 + offset,
        };
        if new_pos < 0 {
            return Err(Error::Unsupported("negative seek position".to_string()));
        }
        self.file_pos = new_pos as u64;
        Ok(self.file_pos)
    }

    /// Write `buf` at the current position as segment rewrites
    ///
    /// Walks the existing segments to the write position, then per segment:
    /// keep the old bytes before the position, lay in new bytes up to the
    /// segment's capacity, and when the data runs out mid-segment copy the
    /// old bytes after it back in, so a short overwrite never truncates.
    /// Interior segments keep their exact old size; the final segment and
    /// fresh segments are bounded by the chunk size.
    pub(crate) async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // Skip the segments wholly before the write position. A short final
        // segment of a static large object is reopened rather than skipped,
        // so the manifest never accumulates undersized interior segments.
        let mut cursor: u64 = 0;
        let mut idx: usize = 0;
        while idx < self.segments.len() {
            let seg_end = cursor + self.segments[idx].size;
            if self.file_pos < seg_end {
                break;
            }
            let last = idx + 1 == self.segments.len();
            if last
                && self.file_pos == seg_end
                && self.file_pos == self.current_length
                && self.segments[idx].size < self.min_chunk_size
            {
                break;
            }
            cursor = seg_end;
            idx += 1;
        }

        // Writing past the end: fill the gap with zero segments, the
        // remainder riding in front of the new data
        let mut leading_zeros: u64 = 0;
        if self.file_pos > self.current_length {
            let mut pad = self.file_pos - self.current_length;
            if self.slo && pad % self.chunk_size != 0 {
                return Err(Error::Unsupported(
                    "write past the end of a static large object must align to the chunk size"
                        .to_string(),
                ));
            }
            while pad >= self.chunk_size {
                let part_number = idx + 1;
                let seg = self
                    .put_segment(part_number, vec![0u8; self.chunk_size as usize])
                    .await?;
                self.segments.push(seg);
                idx += 1;
                cursor += self.chunk_size;
                self.current_length += self.chunk_size;
                pad -= self.chunk_size;
            }
            leading_zeros = pad;
        }

        let mut data = buf;
        let mut pos = self.file_pos;
        while !data.is_empty() || leading_zeros > 0 {
            let existing = idx < self.segments.len();
            let old_size = if existing { self.segments[idx].size } else { 0 };
            // Interior segments must keep their size so the segments after
            // them keep their offsets
            let interior = existing && idx + 1 < self.segments.len();
            let capacity = if interior { old_size } else { self.chunk_size };

            let mut content: Vec<u8> = Vec::with_capacity(capacity as usize);
            if existing {
                let rel = pos - cursor;
                let prefix_len = rel.min(old_size);
                if prefix_len > 0 {
                    content.extend(self.read_segment_range(idx, 0, prefix_len).await?);
                }
            } else if leading_zeros > 0 {
                content.resize(leading_zeros as usize, 0);
                leading_zeros = 0;
            }

            let take = (capacity as usize)
                .saturating_sub(content.len())
                .min(data.len());
            content.extend_from_slice(&data[..take]);
            data = &data[take..];
            pos += take as u64;

            // Data ran out inside this segment: keep the old bytes after it
            if existing && data.is_empty() && (content.len() as u64) < old_size {
                let tail = self
                    .read_segment_range(idx, content.len() as u64, old_size)
                    .await?;
                content.extend(tail);
            }

            let part_number = idx + 1;
            let seg = self.put_segment(part_number, content).await?;
            cursor += seg.size;
            if idx < self.segments.len() {
                self.segments[idx] = seg;
            } else {
                self.segments.push(seg);
            }
            idx += 1;
        }

        self.file_pos = pos;
        self.current_length = self.current_length.max(pos);
        Ok(buf.len())
    }

    /// Bytes `[from, to)` of an existing segment object
    async fn read_segment_range(&self, idx: usize, from: u64, to: u64) -> Result<Vec<u8>> {
        let name = &self.segments[idx].name;
        let mut headers = Headers::new();
        headers.insert("Range", format!("bytes={}-{}", from, to - 1));
        let (mut file, _) = self
            .conn
            .object_open(&self.segment_container, name, false, Some(headers))
            .await?;
        let mut out = Vec::with_capacity((to - from) as usize);
        file.read_to_end(&mut out).await?;
        file.close().await?;
        if out.len() as u64 != to - from {
            return Err(Error::ObjectCorrupted);
        }
        Ok(out)
    }

    /// PUT one segment, recording its name, size and hash
    async fn put_segment(&self, part_number: usize, content: Vec<u8>) -> Result<SegmentInfo> {
        let name = segment_name(&self.prefix, part_number);
        let size = content.len() as u64;
        let local_hash = hex::encode(Md5::digest(&content));
        let headers = self
            .conn
            .object_put_bytes_opts(
                &self.segment_container,
                &name,
                Bytes::from(content),
                self.check_hash,
                "",
                &self.content_type,
                None,
                Vec::new(),
                object_error_map,
            )
            .await?;
        let hash = headers
            .get("Etag")
            .map(|etag| etag.trim_matches('"').to_lowercase())
            .unwrap_or(local_hash);
        Ok(SegmentInfo { name, size, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_name_format() {
        assert_eq!(
            segment_name("segments/abc/def", 1),
            "segments/abc/def/0000000000000001"
        );
        assert_eq!(segment_name("sg", 42), "sg/0000000000000042");
    }

    #[test]
    fn test_parse_full_path() {
        assert_eq!(
            parse_full_path("cont/seg/prefix"),
            ("cont".to_string(), "seg/prefix".to_string())
        );
        assert_eq!(
            parse_full_path("justcontainer"),
            ("justcontainer".to_string(), String::new())
        );
    }

    #[test]
    fn test_segment_dir() {
        assert_eq!(segment_dir("sg/0000000000000001"), "sg");
        assert_eq!(
            segment_dir("segments/abc/def/0000000000000007"),
            "segments/abc/def"
        );
        assert_eq!(segment_dir("bare"), "");
    }

    #[test]
    fn test_generate_segment_path_shape() {
        let path = generate_segment_path("some/object.bin");
        let rest = path.strip_prefix("segments/").unwrap();
        let (head, tail) = rest.split_once('/').unwrap();
        assert_eq!(head.len(), 3);
        assert_eq!(tail.len(), 37);
        assert!(rest
            .bytes()
            .all(|b| b == b'/' || b.is_ascii_hexdigit()));

        // Randomized, so two prefixes for one name must differ
        assert_ne!(path, generate_segment_path("some/object.bin"));
    }

    #[test]
    fn test_is_segment_name() {
        assert!(is_segment_name("sg/0000000000000001", "sg"));
        assert!(!is_segment_name("sg/1", "sg"));
        assert!(!is_segment_name("sg/000000000000000x", "sg"));
        assert!(!is_segment_name("other/0000000000000001", "sg"));
    }

    #[test]
    fn test_slo_manifest_entry_json() {
        let entry = SloManifestEntry {
            path: "segs/sg/0000000000000001".to_string(),
            etag: "abc123".to_string(),
            size_bytes: 6,
        };
        let json = serde_json::to_value([entry]).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "path": "segs/sg/0000000000000001",
                "etag": "abc123",
                "size_bytes": 6
            }])
        );
    }

    #[test]
    fn test_slo_segment_listing_parse() {
        let json = r#"[{"name": "/segs/sg/0000000000000001",
                        "hash": "deadbeef", "bytes": 6,
                        "content_type": "image/jpeg",
                        "last_modified": "2016-12-13T14:05:54.30521"},
                       {"name": "/segs/sg/0000000000000002",
                        "hash": "cafef00d", "bytes": 1}]"#;
        let listing: Vec<SloSegmentListing> = serde_json::from_str(json).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name, "/segs/sg/0000000000000001");
        assert_eq!(listing[0].bytes, 6);
        assert_eq!(listing[1].hash, "cafef00d");
    }

    #[test]
    fn test_bulk_delete_result_parse() {
        let json = r#"{"Number Not Found": 1, "Response Status": "200 OK",
                       "Errors": [["/c/o", "403 Forbidden"]],
                       "Number Deleted": 2, "Response Body": ""}"#;
        let result: BulkDeleteResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.number_deleted, 2);
        assert_eq!(result.number_not_found, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].1, "403 Forbidden");
    }

    #[test]
    fn test_effective_chunk_size() {
        assert_eq!(effective_chunk_size(0), DEFAULT_CHUNK_SIZE);
        assert_eq!(effective_chunk_size(6), 6);
    }
}
