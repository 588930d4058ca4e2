use std::fmt;

use bytes::Bytes;
use log::debug;

use crate::error::Result;
use crate::snapshot;

/// Persistence seam beneath a [`Store`](crate::Store).
///
/// A backend stores snapshot images and nothing else: ordering, buckets,
/// cursors and transaction isolation are provided by the store on top of it.
/// The store calls `acquire` once on open, `persist` under its writer lock for
/// every commit that changed state, and `release` on close.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Location identifier used in logs and errors
    fn location(&self) -> &str;

    /// Take ownership of the resource and return the last committed image,
    /// or `None` when the resource holds no state yet.
    fn acquire(&mut self) -> Result<Option<Bytes>>;

    /// Durably replace the committed image. The image is always the complete
    /// state, never a delta.
    fn persist(&mut self, image: &[u8]) -> Result<()>;

    /// Give the resource back. Must tolerate being called without `acquire`.
    fn release(&mut self) -> Result<()>;
}

/// Process-local backend.
///
/// The last committed image is kept in memory, so a store closed and opened
/// again over the same backend sees its previous state. Nothing survives the
/// process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    image: Option<Bytes>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a snapshot image, e.g. the output of [`Store::backup`](crate::Store::backup).
    ///
    /// The image is validated eagerly.
    pub fn from_bytes(image: impl Into<Bytes>) -> Result<Self> {
        let image = image.into();
        snapshot::decode(&image)?;
        Ok(MemoryBackend { image: Some(image) })
    }
}

impl Backend for MemoryBackend {
    fn location(&self) -> &str {
        ":memory:"
    }

    fn acquire(&mut self) -> Result<Option<Bytes>> {
        Ok(self.image.clone())
    }

    fn persist(&mut self, image: &[u8]) -> Result<()> {
        debug!("memory backend: keeping image of {} bytes", image.len());
        self.image = Some(Bytes::copy_from_slice(image));
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
