use std::cell::{Cell, RefCell};
use std::sync::Arc;

use bytes::BytesMut;
use log::debug;

use crate::bucket::Bucket;
use crate::constants::{TxFlags, MAX_DEPTH};
use crate::context::TraceContext;
use crate::error::{Error, Result};
use crate::node::{resolve_mut, BucketData, Node};
use crate::snapshot;

/// A unit of work handed to [`Store::view`](crate::Store::view) and
/// [`Store::update`](crate::Store::update) closures.
///
/// The transaction works on its own copy-on-write view of the bucket tree:
/// what it reads is the state committed when it began plus its own writes.
/// It cannot outlive the closure it was passed to, and neither can the
/// buckets and cursors derived from it.
#[derive(Debug)]
pub struct Transaction {
    /// Transaction flags
    flags: Cell<TxFlags>,
    /// Working tree
    root: RefCell<Arc<BucketData>>,
    /// Correlation token for logs
    ctx: Cell<TraceContext>,
}

impl Transaction {
    pub(crate) fn new(root: Arc<BucketData>, ctx: TraceContext, writable: bool) -> Self {
        let flags = if writable {
            TxFlags::empty()
        } else {
            TxFlags::RDONLY
        };
        debug!(
            "begin {} transaction ctx={}",
            if writable { "update" } else { "view" },
            ctx
        );
        Transaction {
            flags: Cell::new(flags),
            root: RefCell::new(root),
            ctx: Cell::new(ctx),
        }
    }

    /// Trace context of this transaction
    pub fn context(&self) -> TraceContext {
        self.ctx.get()
    }

    /// Replace the trace context, e.g. to attach a child span.
    ///
    /// This never affects whether the transaction commits.
    pub fn with_context(&self, ctx: TraceContext) {
        self.ctx.set(ctx);
    }

    pub fn is_writable(&self) -> bool {
        !self.flags.get().contains(TxFlags::RDONLY)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.flags.get().contains(TxFlags::DIRTY)
    }

    /// Encode the working tree as a snapshot image
    pub(crate) fn image(&self) -> Result<BytesMut> {
        snapshot::encode(&self.root.borrow())
    }

    /// Hand back the working tree once the closure has returned
    pub(crate) fn into_root(self) -> Arc<BucketData> {
        self.root.into_inner()
    }

    /// Retrieve the bucket named `name`, creating it if it does not exist.
    ///
    /// Creation needs a write transaction: asking a read-only transaction for
    /// a missing bucket fails with [`Error::TxNotWritable`].
    pub fn bucket(&self, name: &[u8]) -> Result<Bucket<'_>> {
        match self.get_bucket(name) {
            Err(Error::BucketNotFound(_)) => self.create_bucket_if_not_exists(name),
            other => other,
        }
    }

    /// Retrieve an existing top-level bucket
    pub fn get_bucket(&self, name: &[u8]) -> Result<Bucket<'_>> {
        if name.is_empty() {
            return Err(Error::BucketNameRequired);
        }
        if self.root.borrow().child(name).is_none() {
            return Err(Error::BucketNotFound(name.to_vec()));
        }
        Ok(Bucket::new(self, vec![name.to_vec()]))
    }

    /// Create a top-level bucket; fails if it already exists
    pub fn create_bucket(&self, name: &[u8]) -> Result<Bucket<'_>> {
        self.create_child(&[], name, false)?;
        Ok(Bucket::new(self, vec![name.to_vec()]))
    }

    /// Create a top-level bucket unless it already exists
    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> Result<Bucket<'_>> {
        self.create_child(&[], name, true)?;
        Ok(Bucket::new(self, vec![name.to_vec()]))
    }

    /// Delete a top-level bucket and everything nested in it
    pub fn delete_bucket(&self, name: &[u8]) -> Result<()> {
        self.delete_child(&[], name)
    }

    /// Names of all top-level buckets in key order
    pub fn bucket_names(&self) -> Vec<Vec<u8>> {
        self.root.borrow().entries.keys().cloned().collect()
    }

    /// Run `f` against the bucket at `path`, if it still exists
    pub(crate) fn read<R>(&self, path: &[Vec<u8>], f: impl FnOnce(&BucketData) -> R) -> Option<R> {
        let root = self.root.borrow();
        root.resolve(path).map(f)
    }

    /// Run `f` against a writable copy of the bucket at `path`
    pub(crate) fn write<R>(
        &self,
        path: &[Vec<u8>],
        f: impl FnOnce(&mut BucketData) -> Result<R>,
    ) -> Result<R> {
        if !self.is_writable() {
            return Err(Error::TxNotWritable);
        }
        let mut root = self.root.borrow_mut();
        let data = resolve_mut(&mut *root, path).ok_or_else(|| {
            Error::BucketNotFound(path.last().cloned().unwrap_or_default())
        })?;
        let out = f(data)?;
        self.flags.set(self.flags.get() | TxFlags::DIRTY);
        Ok(out)
    }

    pub(crate) fn create_child(&self, parent: &[Vec<u8>], name: &[u8], exist_ok: bool) -> Result<()> {
        if name.is_empty() {
            return Err(Error::BucketNameRequired);
        }
        if parent.len() >= MAX_DEPTH {
            return Err(Error::NestingTooDeep(MAX_DEPTH));
        }
        snapshot::frame_len(name.len())?;
        if exist_ok {
            let exists = self.read(parent, |data| data.child(name).is_some());
            if exists == Some(true) {
                return Ok(());
            }
        }
        self.write(parent, |data| match data.get(name) {
            Some(Node::Bucket(_)) if exist_ok => Ok(()),
            Some(Node::Bucket(_)) => Err(Error::BucketExists(name.to_vec())),
            Some(Node::Value(_)) => Err(Error::IncompatibleValue),
            None => {
                data.entries
                    .insert(name.to_vec(), Node::Bucket(Arc::new(BucketData::new())));
                Ok(())
            }
        })
    }

    pub(crate) fn delete_child(&self, parent: &[Vec<u8>], name: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::BucketNameRequired);
        }
        self.write(parent, |data| match data.get(name) {
            Some(Node::Bucket(_)) => {
                data.entries.remove(name);
                Ok(())
            }
            Some(Node::Value(_)) => Err(Error::IncompatibleValue),
            None => Err(Error::BucketNotFound(name.to_vec())),
        })
    }
}
