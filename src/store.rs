use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::backend::{Backend, MemoryBackend};
use crate::bucket::Bucket;
use crate::constants::StoreFlags;
use crate::context::TraceContext;
use crate::error::{Error, Result};
use crate::file::FileBackend;
use crate::node::BucketData;
use crate::snapshot;
use crate::transaction::Transaction;

/// Transactional key-value store.
///
/// Work runs inside closures handed to [`Store::view`] (read-only) or
/// [`Store::update`] (read-write). A view sees the state committed when it
/// began and never waits for writers. Updates are serialised: an update that
/// returns `Ok` commits, any `Err` discards its writes.
///
/// Every commit encodes and persists the whole tree, so its cost grows with
/// the size of the store, not with the size of the change.
///
/// ```no_run
/// use lumokv::{Store, TraceContext};
///
/// let mut store = Store::new("/tmp/lumokv/data.db");
/// store.open()?;
/// let ctx = TraceContext::new();
/// store.update(&ctx, |tx| tx.bucket(b"users")?.put(b"ada", b"lovelace"))?;
/// let value = store.view(&ctx, |tx| tx.get_bucket(b"users")?.get(b"ada"))?;
/// assert_eq!(value, b"lovelace");
/// store.close()?;
/// # Ok::<(), lumokv::Error>(())
/// ```
#[derive(Debug)]
pub struct Store {
    /// Printable location of the backend
    location: String,
    /// Store flags
    flags: StoreFlags,
    /// Backend, locked for the whole of an update
    writer: Mutex<Box<dyn Backend>>,
    /// Last committed tree, `None` while closed
    root: RwLock<Option<Arc<BucketData>>>,
}

impl Store {
    /// Store persisted to a file at `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_flags(path, StoreFlags::empty())
    }

    pub fn with_flags(path: impl AsRef<Path>, flags: StoreFlags) -> Self {
        Self::with_backend(FileBackend::new(path, flags), flags)
    }

    /// Store kept in process memory
    pub fn in_memory() -> Self {
        Self::with_backend(MemoryBackend::new(), StoreFlags::empty())
    }

    pub fn with_backend<B: Backend + 'static>(backend: B, flags: StoreFlags) -> Self {
        Store {
            location: backend.location().to_string(),
            flags,
            writer: Mutex::new(Box::new(backend)),
            root: RwLock::new(None),
        }
    }

    /// Location identifier of the backend
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn flags(&self) -> StoreFlags {
        self.flags
    }

    pub fn is_open(&self) -> bool {
        self.root.read().is_some()
    }

    /// Acquire the backend and load the last committed state.
    ///
    /// For file stores this creates the parent directory and the data file
    /// when missing, and waits at most [`OPEN_TIMEOUT`](crate::OPEN_TIMEOUT)
    /// for the exclusive lock.
    pub fn open(&mut self) -> Result<()> {
        if self.root.get_mut().is_some() {
            return Err(Error::AlreadyOpen);
        }

        let backend = self.writer.get_mut();
        let root = match backend.acquire()? {
            Some(image) => match snapshot::decode(&image) {
                Ok(root) => root,
                Err(e) => {
                    if let Err(release) = backend.release() {
                        warn!("failed to release {}: {}", self.location, release);
                    }
                    return Err(e);
                }
            },
            None => BucketData::new(),
        };

        info!(
            "Resources opened: location={}, buckets={}",
            self.location,
            root.len()
        );
        *self.root.get_mut() = Some(Arc::new(root));
        Ok(())
    }

    /// Release the backend. Closing a store that is not open does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.root.get_mut().take().is_none() {
            return Ok(());
        }

        match self.writer.get_mut().release() {
            Ok(()) => {
                info!("Resources released: location={}", self.location);
                Ok(())
            }
            Err(e) => {
                warn!("failed to release {}: {}", self.location, e);
                Err(e)
            }
        }
    }

    fn committed(&self) -> Result<Arc<BucketData>> {
        self.root.read().clone().ok_or(Error::StoreClosed)
    }

    /// Run `f` inside a read-only transaction.
    ///
    /// Write attempts inside `f` fail with [`Error::TxNotWritable`]. The
    /// result of `f` is returned unchanged.
    pub fn view<T, E, F>(&self, ctx: &TraceContext, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&Transaction) -> std::result::Result<T, E>,
    {
        let root = self.committed()?;
        let tx = Transaction::new(root, ctx.child(), false);
        let result = f(&tx);
        debug!("end view transaction ctx={}", tx.context());
        result
    }

    /// Run `f` inside a read-write transaction.
    ///
    /// If `f` returns `Ok`, its writes are persisted and published before
    /// `update` returns. If it returns `Err`, its writes are discarded and the
    /// error is returned unchanged.
    pub fn update<T, E, F>(&self, ctx: &TraceContext, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&Transaction) -> std::result::Result<T, E>,
    {
        if self.flags.contains(StoreFlags::RDONLY) {
            return Err(Error::StoreReadOnly.into());
        }

        let mut backend = self.writer.lock();
        let root = self.committed()?;
        let tx = Transaction::new(root, ctx.child(), true);

        let value = match f(&tx) {
            Ok(value) => value,
            Err(e) => {
                debug!("rollback update transaction ctx={}", tx.context());
                return Err(e);
            }
        };

        let ctx = tx.context();
        if !tx.is_dirty() {
            debug!("commit update transaction ctx={}: no changes", ctx);
            return Ok(value);
        }

        let image = tx.image()?;
        backend.persist(&image)?;
        *self.root.write() = Some(tx.into_root());
        debug!(
            "commit update transaction ctx={}: {} bytes",
            ctx,
            image.len()
        );
        Ok(value)
    }

    /// Empty every bucket, nested buckets included, keeping the buckets.
    pub fn flush(&self, ctx: &TraceContext) -> Result<()> {
        let result = self.update(ctx, |tx| {
            for name in tx.bucket_names() {
                empty_bucket(&tx.get_bucket(&name)?)?;
            }
            Ok(())
        });
        if let Err(e) = &result {
            warn!("flush of {} failed: {}", self.location, e);
        }
        result
    }

    /// Write the complete committed state to `writer` as a snapshot image.
    ///
    /// Returns the number of bytes written. The image can be opened as a
    /// data file or handed to [`MemoryBackend::from_bytes`].
    pub fn backup<W: Write + ?Sized>(&self, ctx: &TraceContext, writer: &mut W) -> Result<u64> {
        self.view(ctx, |tx| {
            let image = tx.image()?;
            writer.write_all(&image)?;
            writer.flush()?;
            debug!(
                "backup of {} ctx={}: {} bytes",
                self.location,
                tx.context(),
                image.len()
            );
            Ok(image.len() as u64)
        })
    }
}

/// Delete the plain entries of `bucket` and of every bucket nested in it
fn empty_bucket(bucket: &Bucket<'_>) -> Result<()> {
    let mut cursor = bucket.cursor(&[])?;
    let mut entry = cursor.first();
    while let Some((key, _)) = entry {
        if bucket.is_bucket(&key) {
            empty_bucket(&bucket.bucket(&key)?)?;
        } else {
            bucket.delete(&key)?;
        }
        entry = cursor.next();
    }
    Ok(())
}

impl Drop for Store {
    fn drop(&mut self) {
        // close logs its own failure
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> Store {
        let mut store = Store::in_memory();
        store.open().unwrap();
        store
    }

    #[test]
    fn test_open_close_lifecycle() {
        let mut store = Store::in_memory();
        assert!(!store.is_open());
        store.close().unwrap();

        store.open().unwrap();
        assert!(store.is_open());
        assert!(matches!(store.open(), Err(Error::AlreadyOpen)));

        store.close().unwrap();
        store.close().unwrap();
        let ctx = TraceContext::new();
        let err = store.view(&ctx, |_| Ok::<_, Error>(())).unwrap_err();
        assert!(matches!(err, Error::StoreClosed));
    }

    #[test]
    fn test_memory_store_survives_reopen() {
        let mut store = opened();
        let ctx = TraceContext::new();
        store
            .update(&ctx, |tx| tx.bucket(b"b")?.put(b"k", b"v"))
            .unwrap();
        store.close().unwrap();
        store.open().unwrap();
        let value = store
            .view(&ctx, |tx| tx.get_bucket(b"b")?.get(b"k"))
            .unwrap();
        assert_eq!(value, b"v");
    }

    #[test]
    fn test_update_error_rolls_back() {
        let store = opened();
        let ctx = TraceContext::new();
        let err = store
            .update(&ctx, |tx| {
                tx.bucket(b"b")?.put(b"k", b"v")?;
                Err::<(), _>(Error::Invalid)
            })
            .unwrap_err();
        assert!(matches!(err, Error::Invalid));

        let names = store
            .view(&ctx, |tx| Ok::<_, Error>(tx.bucket_names()))
            .unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_readonly_store_refuses_updates() {
        let mut store = Store::with_backend(MemoryBackend::new(), StoreFlags::RDONLY);
        store.open().unwrap();
        let ctx = TraceContext::new();
        let err = store.update(&ctx, |_| Ok::<_, Error>(())).unwrap_err();
        assert!(matches!(err, Error::StoreReadOnly));
        assert!(matches!(store.flush(&ctx), Err(Error::StoreReadOnly)));
    }

    #[test]
    fn test_flush_empties_nested_buckets() {
        let store = opened();
        let ctx = TraceContext::new();
        store
            .update(&ctx, |tx| {
                let outer = tx.bucket(b"outer")?;
                outer.put(b"a", b"1")?;
                let inner = outer.create_bucket(b"inner")?;
                inner.put(b"b", b"2")?;
                inner.create_bucket(b"deepest")?.put(b"c", b"3")
            })
            .unwrap();

        store.flush(&ctx).unwrap();

        store
            .view(&ctx, |tx| {
                let outer = tx.get_bucket(b"outer")?;
                assert_eq!(outer.len(), 1);
                let inner = outer.bucket(b"inner")?;
                assert_eq!(inner.len(), 1);
                assert!(inner.bucket(b"deepest")?.is_empty());
                Ok::<_, Error>(())
            })
            .unwrap();
    }

    #[test]
    fn test_backup_reports_bytes_written() {
        let store = opened();
        let ctx = TraceContext::new();
        store
            .update(&ctx, |tx| tx.bucket(b"b")?.put(b"k", b"v"))
            .unwrap();

        let mut out = Vec::new();
        let written = store.backup(&ctx, &mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        assert!(snapshot::decode(&out).is_ok());
    }
}
