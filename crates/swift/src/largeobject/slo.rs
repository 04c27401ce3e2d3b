//! Static large objects
//!
//! The manifest body is a JSON array naming each segment with its size and
//! hash, uploaded with `multipart-manifest=put`; the server verifies every
//! entry. Requires the `slo` middleware, discovered through `/info`.

use std::io::SeekFrom;

use async_trait::async_trait;

use sc_core::{Error, Result};

use super::{with_buffer, LargeObjectCore, LargeObjectFile, LargeObjectOpts};
use crate::connection::Connection;

/// An open static large object
pub struct StaticLargeObjectCreateFile<'a> {
    core: LargeObjectCore<'a>,
}

impl Connection {
    /// Open a static large object for writing
    ///
    /// Fails with `SloNotSupported` when the server does not advertise the
    /// `slo` middleware. The minimum chunk size is raised to the server's
    /// reported minimum segment size.
    pub async fn static_large_object_create_file(
        &self,
        opts: &LargeObjectOpts,
    ) -> Result<Box<dyn LargeObjectFile + '_>> {
        let info = self
            .cached_query_info()
            .await
            .map_err(|_| Error::SloNotSupported)?;
        if !info.supports_slo() {
            return Err(Error::SloNotSupported);
        }
        let mut opts = opts.clone();
        let server_min = info.slo_min_segment_size();
        if server_min > opts.min_chunk_size {
            opts.min_chunk_size = server_min;
        }
        let core = self.large_object_create(&opts, true).await?;
        Ok(with_buffer(
            &opts,
            Box::new(StaticLargeObjectCreateFile { core }),
        ))
    }

    /// Create or truncate a static large object
    pub async fn static_large_object_create(
        &self,
        opts: &LargeObjectOpts,
    ) -> Result<Box<dyn LargeObjectFile + '_>> {
        let mut opts = opts.clone();
        opts.truncate = true;
        self.static_large_object_create_file(&opts).await
    }

    /// Delete a static large object and all of its segments
    pub async fn static_large_object_delete(
        &self,
        container: &str,
        object_name: &str,
    ) -> Result<()> {
        let info = self
            .cached_query_info()
            .await
            .map_err(|_| Error::SloNotSupported)?;
        if !info.supports_slo() {
            return Err(Error::SloNotSupported);
        }
        self.large_object_delete(container, object_name).await
    }

    /// Move a static large object without copying its segments
    ///
    /// Writes a new manifest at the destination referencing the same
    /// segment objects, keeping the content type and object metadata while
    /// dropping request-identity headers, then deletes the source manifest.
    pub async fn static_large_object_move(
        &self,
        src_container: &str,
        src_object_name: &str,
        dst_container: &str,
        dst_object_name: &str,
    ) -> Result<()> {
        let info = self
            .cached_query_info()
            .await
            .map_err(|_| Error::SloNotSupported)?;
        if !info.supports_slo() {
            return Err(Error::SloNotSupported);
        }
        let (object_info, headers) = self.object(src_container, src_object_name).await?;
        let (segment_container, segments) = self
            .get_all_segments(src_container, src_object_name, &headers)
            .await?;
        // Only metadata is safe to carry over; the server regenerates the
        // request-identity headers
        let carried = headers.object_metadata().object_headers();
        self.create_slo_manifest(
            dst_container,
            dst_object_name,
            &object_info.content_type,
            &segment_container,
            &segments,
            Some(carried),
        )
        .await?;
        self.object_delete(src_container, src_object_name).await
    }
}

#[async_trait]
impl LargeObjectFile for StaticLargeObjectCreateFile<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.core.write(buf).await
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.core.seek(pos)
    }

    async fn flush(&mut self) -> Result<()> {
        self.core
            .conn
            .create_slo_manifest(
                &self.core.container,
                &self.core.object_name,
                &self.core.content_type,
                &self.core.segment_container,
                &self.core.segments,
                Some(self.core.headers.clone()),
            )
            .await?;
        self.core
            .conn
            .wait_for_object_size(&self.core.container, &self.core.object_name, self.core.size())
            .await
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await
    }

    fn size(&self) -> u64 {
        self.core.size()
    }
}
