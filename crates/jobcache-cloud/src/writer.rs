//! ObjectWriter - provides synchronous Write for object uploads

use crate::buffer::WriteBuffer;
use crate::error::Result;
use object_store::{path::Path as ObjectPath, MultipartUpload, ObjectStore};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

/// Uploads one object through a synchronous [`Write`]
///
/// Data is buffered; objects that fit in the buffer are stored with a single
/// PUT by [`ObjectWriter::finish`], larger ones switch to a multipart upload
/// as soon as the buffer fills. Nothing is visible at the destination until
/// `finish` succeeds, and a writer dropped before that aborts its upload.
pub struct ObjectWriter {
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    handle: Handle,
    buffer: WriteBuffer,
    upload: Option<Box<dyn MultipartUpload>>,
    parts: usize,
    bytes_written: u64,
    finished: bool,
}

impl ObjectWriter {
    /// Create a writer for `path` driven by `handle`
    pub fn new(
        store: Arc<dyn ObjectStore>,
        path: ObjectPath,
        handle: Handle,
        buffer_size: usize,
    ) -> Self {
        Self {
            store,
            path,
            handle,
            buffer: WriteBuffer::new(buffer_size),
            upload: None,
            parts: 0,
            bytes_written: 0,
            finished: false,
        }
    }

    /// Send the buffer as the next part, starting the upload if needed
    fn upload_part(&mut self) -> Result<()> {
        if self.upload.is_none() {
            debug!("Starting multipart upload for {}", self.path);
            let upload = self.handle.block_on(self.store.put_multipart(&self.path))?;
            self.upload = Some(upload);
        }

        let data = self.buffer.take();
        if let Some(upload) = self.upload.as_mut() {
            trace!("Uploading part {} of {} ({} bytes)", self.parts, self.path, data.len());
            self.handle.block_on(upload.put_part(data.into()))?;
            self.parts += 1;
        }
        Ok(())
    }

    /// Complete the upload and make the object visible
    pub fn finish(mut self) -> Result<u64> {
        self.finished = true;
        let data = self.buffer.take();

        match self.upload.take() {
            Some(mut upload) => {
                let result = self.handle.block_on(async {
                    if !data.is_empty() {
                        upload.put_part(data.into()).await?;
                    }
                    upload.complete().await
                });
                if let Err(e) = result {
                    if let Err(abort) = self.handle.block_on(upload.abort()) {
                        warn!("Failed to abort upload of {}: {}", self.path, abort);
                    }
                    return Err(e.into());
                }
                debug!(
                    "Completed multipart upload of {} ({} parts)",
                    self.path,
                    self.parts + 1
                );
            }
            None => {
                debug!("Uploading {} bytes to {}", data.len(), self.path);
                self.handle.block_on(self.store.put(&self.path, data.into()))?;
            }
        }

        Ok(self.bytes_written)
    }
}

impl Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let n = self.buffer.write(remaining);
            self.bytes_written += n as u64;
            remaining = &remaining[n..];

            if self.buffer.is_full() {
                self.upload_part()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // parts are only sent when the buffer fills or on finish
        Ok(())
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(mut upload) = self.upload.take() {
            debug!("Aborting unfinished upload of {}", self.path);
            if let Err(e) = self.handle.block_on(upload.abort()) {
                warn!("Failed to abort upload of {}: {}", self.path, e);
            }
        }
    }
}

impl fmt::Debug for ObjectWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("path", &self.path)
            .field("buffered", &self.buffer.len())
            .field("parts", &self.parts)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::build_runtime;
    use object_store::memory::InMemory;

    fn read(runtime: &tokio::runtime::Runtime, store: &InMemory, path: &ObjectPath) -> Vec<u8> {
        runtime.block_on(async {
            store.get(path).await.unwrap().bytes().await.unwrap().to_vec()
        })
    }

    #[test]
    fn test_small_object_is_single_put() {
        let runtime = build_runtime(1).unwrap();
        let store = Arc::new(InMemory::new());
        let path = ObjectPath::from("cache/config.xml");

        let mut writer = ObjectWriter::new(store.clone(), path.clone(), runtime.handle().clone(), 1024);
        writer.write_all(b"<configuration/>").unwrap();
        assert_eq!(writer.finish().unwrap(), 16);
        assert_eq!(read(&runtime, &store, &path), b"<configuration/>");
    }

    #[test]
    fn test_large_object_uses_parts() {
        let runtime = build_runtime(1).unwrap();
        let store = Arc::new(InMemory::new());
        let path = ObjectPath::from("cache/app.jar");
        let data: Vec<u8> = (0..100u8).collect();

        let mut writer = ObjectWriter::new(store.clone(), path.clone(), runtime.handle().clone(), 16);
        writer.write_all(&data).unwrap();
        assert!(writer.parts > 0);
        writer.finish().unwrap();
        assert_eq!(read(&runtime, &store, &path), data);
    }

    #[test]
    fn test_empty_object_is_written() {
        let runtime = build_runtime(1).unwrap();
        let store = Arc::new(InMemory::new());
        let path = ObjectPath::from("cache/empty");

        let writer = ObjectWriter::new(store.clone(), path.clone(), runtime.handle().clone(), 16);
        writer.finish().unwrap();
        assert!(read(&runtime, &store, &path).is_empty());
    }

    #[test]
    fn test_dropped_writer_leaves_nothing() {
        let runtime = build_runtime(1).unwrap();
        let store = Arc::new(InMemory::new());
        let path = ObjectPath::from("cache/partial.jar");

        {
            let mut writer = ObjectWriter::new(store.clone(), path.clone(), runtime.handle().clone(), 8);
            writer.write_all(&[7u8; 40]).unwrap();
        }
        let missing = runtime.block_on(async { store.head(&path).await });
        assert!(matches!(missing, Err(object_store::Error::NotFound { .. })));
    }
}
