//! Dynamic large objects
//!
//! The manifest is a zero-byte object whose `X-Object-Manifest` header names
//! `container/prefix`; the logical object is the concatenation of every
//! object under that prefix in name order.

use std::io::SeekFrom;

use async_trait::async_trait;

use sc_core::{Error, Result};

use super::{with_buffer, LargeObjectCore, LargeObjectFile, LargeObjectOpts};
use crate::connection::Connection;

/// An open dynamic large object
pub struct DynamicLargeObjectCreateFile<'a> {
    core: LargeObjectCore<'a>,
}

impl Connection {
    /// Open a dynamic large object for writing
    ///
    /// Honors `truncate` and `append` in the options; an existing plain
    /// object is adopted as the first segment.
    pub async fn dynamic_large_object_create_file(
        &self,
        opts: &LargeObjectOpts,
    ) -> Result<Box<dyn LargeObjectFile + '_>> {
        let core = self.large_object_create(opts, false).await?;
        Ok(with_buffer(
            opts,
            Box::new(DynamicLargeObjectCreateFile { core }),
        ))
    }

    /// Create or truncate a dynamic large object
    pub async fn dynamic_large_object_create(
        &self,
        opts: &LargeObjectOpts,
    ) -> Result<Box<dyn LargeObjectFile + '_>> {
        let mut opts = opts.clone();
        opts.truncate = true;
        self.dynamic_large_object_create_file(&opts).await
    }

    /// Delete a dynamic large object and all of its segments
    pub async fn dynamic_large_object_delete(
        &self,
        container: &str,
        object_name: &str,
    ) -> Result<()> {
        self.large_object_delete(container, object_name).await
    }

    /// Move a dynamic large object without copying its segments
    ///
    /// A new manifest pointing at the same segments is written at the
    /// destination, carrying over the content type and object metadata but
    /// not the request-identity headers, then the source manifest is
    /// deleted.
    pub async fn dynamic_large_object_move(
        &self,
        src_container: &str,
        src_object_name: &str,
        dst_container: &str,
        dst_object_name: &str,
    ) -> Result<()> {
        let (info, headers) = self.object(src_container, src_object_name).await?;
        let manifest = headers
            .get("X-Object-Manifest")
            .ok_or(Error::NotLargeObject)?
            .to_string();
        let carried = headers.object_metadata().object_headers();
        self.create_dlo_manifest(
            dst_container,
            dst_object_name,
            &manifest,
            &info.content_type,
            Some(carried),
        )
        .await?;
        self.object_delete(src_container, src_object_name).await
    }
}

#[async_trait]
impl LargeObjectFile for DynamicLargeObjectCreateFile<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.core.write(buf).await
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.core.seek(pos)
    }

    async fn flush(&mut self) -> Result<()> {
        let manifest = format!("{}/{}", self.core.segment_container, self.core.prefix);
        self.core
            .conn
            .create_dlo_manifest(
                &self.core.container,
                &self.core.object_name,
                &manifest,
                &self.core.content_type,
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
