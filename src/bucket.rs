use log::trace;

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::snapshot;
use crate::transaction::Transaction;
use crate::types::{CursorConfig, CursorHint, CursorOption, Direction};

/// Handle to a bucket inside a transaction.
///
/// A handle addresses its bucket by path and reads through the transaction's
/// working tree on every call, so it always observes the transaction's own
/// writes. Operations on a bucket deleted after the handle was taken fail
/// with [`Error::BucketNotFound`] (or yield nothing, for reads).
#[derive(Debug, Clone)]
pub struct Bucket<'tx> {
    tx: &'tx Transaction,
    path: Vec<Vec<u8>>,
}

impl<'tx> Bucket<'tx> {
    pub(crate) fn new(tx: &'tx Transaction, path: Vec<Vec<u8>>) -> Self {
        Bucket { tx, path }
    }

    /// Name of this bucket
    pub fn name(&self) -> &[u8] {
        self.path.last().map(Vec::as_slice).unwrap_or_default()
    }

    /// Names from the top-level bucket down to this one
    pub fn path(&self) -> &[Vec<u8>] {
        &self.path
    }

    /// Retrieve the value stored at `key`.
    ///
    /// Absent keys, empty values and keys naming a nested bucket all fail
    /// with [`Error::KeyNotFound`].
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let value = self.tx.read(&self.path, |data| match data.get(key) {
            Some(Node::Value(v)) if !v.is_empty() => Some(v.clone()),
            _ => None,
        });
        value.flatten().ok_or(Error::KeyNotFound)
    }

    /// Set the value at `key`.
    ///
    /// Keys and values longer than `u32::MAX` bytes fail with
    /// [`Error::EntryTooLarge`].
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if !self.tx.is_writable() {
            return Err(Error::TxNotWritable);
        }
        if key.is_empty() {
            return Err(Error::KeyRequired);
        }
        snapshot::frame_len(key.len())?;
        snapshot::frame_len(value.len())?;
        self.tx.write(&self.path, |data| {
            match data.entries.get_mut(key) {
                Some(Node::Bucket(_)) => return Err(Error::IncompatibleValue),
                Some(Node::Value(v)) => *v = value.to_vec(),
                None => {
                    data.entries.insert(key.to_vec(), Node::Value(value.to_vec()));
                }
            }
            Ok(())
        })
    }

    /// Remove `key`; absent keys are not an error
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.tx.write(&self.path, |data| match data.get(key) {
            Some(Node::Bucket(_)) => Err(Error::IncompatibleValue),
            Some(Node::Value(_)) => {
                data.entries.remove(key);
                Ok(())
            }
            None => Ok(()),
        })
    }

    /// Whether `key` names a nested bucket
    pub fn is_bucket(&self, key: &[u8]) -> bool {
        self.tx
            .read(&self.path, |data| data.child(key).is_some())
            .unwrap_or(false)
    }

    /// Number of entries, nested buckets included
    pub fn len(&self) -> usize {
        self.tx.read(&self.path, |data| data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve an existing nested bucket
    pub fn bucket(&self, name: &[u8]) -> Result<Bucket<'tx>> {
        if name.is_empty() {
            return Err(Error::BucketNameRequired);
        }
        match self.tx.read(&self.path, |data| data.child(name).is_some()) {
            Some(true) => Ok(self.nested(name)),
            _ => Err(Error::BucketNotFound(name.to_vec())),
        }
    }

    /// Create a nested bucket; fails if it already exists
    pub fn create_bucket(&self, name: &[u8]) -> Result<Bucket<'tx>> {
        self.tx.create_child(&self.path, name, false)?;
        Ok(self.nested(name))
    }

    /// Create a nested bucket unless it already exists
    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> Result<Bucket<'tx>> {
        self.tx.create_child(&self.path, name, true)?;
        Ok(self.nested(name))
    }

    /// Delete a nested bucket and everything below it
    pub fn delete_bucket(&self, name: &[u8]) -> Result<()> {
        self.tx.delete_child(&self.path, name)
    }

    fn nested(&self, name: &[u8]) -> Bucket<'tx> {
        let mut path = self.path.clone();
        path.push(name.to_vec());
        Bucket::new(self.tx, path)
    }

    /// Ascending, unconstrained cursor over this bucket.
    ///
    /// Hints are advisory and currently ignored.
    pub fn cursor(&self, hints: &[CursorHint]) -> Result<Cursor<'tx>> {
        if !hints.is_empty() {
            trace!("ignoring {} cursor hint(s)", hints.len());
        }
        Ok(Cursor::new(
            self.tx,
            self.path.clone(),
            CursorConfig::default(),
        ))
    }

    /// Cursor positioned at `seek` and configured by `opts`.
    ///
    /// An empty `seek` starts at the first entry, or at the last one when
    /// iterating in descending order. With a prefix configured, a seek key
    /// outside the prefix fails with [`Error::SeekPrefixMismatch`].
    pub fn forward_cursor(&self, seek: &[u8], opts: &[CursorOption]) -> Result<Cursor<'tx>> {
        let config = CursorConfig::new(opts);
        let mut cursor = Cursor::new(self.tx, self.path.clone(), config.clone());

        let mut seek = seek.to_vec();
        if seek.is_empty() && config.direction == Direction::Descending {
            if let Some((key, _)) = cursor.last() {
                seek = key;
            }
        }

        let first = cursor.seek(&seek);

        if config.missing_prefix(&seek) {
            return Err(Error::SeekPrefixMismatch {
                seek,
                prefix: config.prefix.unwrap_or_default(),
            });
        }

        // only remember the seeked entry if it is not skipped
        if !config.skip_first {
            cursor.set_pending(first);
        }

        Ok(cursor)
    }
}
