use crate::error::Result;
use crate::node::Node;
use crate::transaction::Transaction;
use crate::types::{CursorConfig, Direction, KeyValue};

/// Where the cursor sits relative to the bucket's keys
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    /// Never positioned
    Unset,
    /// On an existing key
    At(Vec<u8>),
    /// Stepped or sought past the last key
    AfterEnd,
    /// Stepped before the first key
    BeforeStart,
}

/// Ordered iterator over one bucket.
///
/// A cursor is positioned by key, not by slot, so writes made through the
/// same transaction while iterating (deleting the current entry, inserting
/// ahead of it) are observed without invalidating the cursor.
///
/// `next` and `prev` honour the configured direction and prefix: once a step
/// runs off the end of the bucket or reaches a key outside the prefix, both
/// keep returning `None` until the cursor is repositioned with `first`, `last`
/// or `seek`. Nested buckets are yielded with an empty value.
#[derive(Debug)]
pub struct Cursor<'tx> {
    /// The transaction this cursor reads through
    tx: &'tx Transaction,
    /// Path of the bucket being iterated
    path: Vec<Vec<u8>>,
    /// Current position
    position: Position,
    /// Entry found at construction, handed out by the first step
    pending: Option<KeyValue>,
    /// Direction and prefix
    config: CursorConfig,
    /// Set once a step ran out of entries or out of the prefix
    exhausted: bool,
    /// Set by `close`
    closed: bool,
}

fn owned(entry: Option<(&Vec<u8>, &Node)>) -> Option<KeyValue> {
    entry.map(|(key, node)| (key.clone(), node.cursor_value()))
}

impl<'tx> Cursor<'tx> {
    pub(crate) fn new(tx: &'tx Transaction, path: Vec<Vec<u8>>, config: CursorConfig) -> Self {
        Cursor {
            tx,
            path,
            position: Position::Unset,
            pending: None,
            config,
            exhausted: false,
            closed: false,
        }
    }

    pub(crate) fn set_pending(&mut self, entry: Option<KeyValue>) {
        self.pending = entry;
    }

    /// Configuration this cursor was built with
    pub fn config(&self) -> &CursorConfig {
        &self.config
    }

    /// Position at the first entry of the bucket
    pub fn first(&mut self) -> Option<KeyValue> {
        if self.closed {
            return None;
        }
        self.reposition();
        let found = self.tx.read(&self.path, |data| owned(data.first())).flatten();
        self.position = match &found {
            Some((key, _)) => Position::At(key.clone()),
            None => Position::Unset,
        };
        found
    }

    /// Position at the last entry of the bucket
    pub fn last(&mut self) -> Option<KeyValue> {
        if self.closed {
            return None;
        }
        self.reposition();
        let found = self.tx.read(&self.path, |data| owned(data.last())).flatten();
        self.position = match &found {
            Some((key, _)) => Position::At(key.clone()),
            None => Position::Unset,
        };
        found
    }

    /// Position at the first entry whose key is >= `key`
    pub fn seek(&mut self, key: &[u8]) -> Option<KeyValue> {
        if self.closed {
            return None;
        }
        self.reposition();
        let found = self.tx.read(&self.path, |data| owned(data.seek(key))).flatten();
        self.position = match &found {
            Some((key, _)) => Position::At(key.clone()),
            None => Position::AfterEnd,
        };
        found
    }

    /// Step once in the configured direction
    pub fn next(&mut self) -> Option<KeyValue> {
        self.advance(self.config.direction == Direction::Ascending)
    }

    /// Step once against the configured direction
    pub fn prev(&mut self) -> Option<KeyValue> {
        self.advance(self.config.direction == Direction::Descending)
    }

    /// Iteration never fails once the cursor exists.
    pub fn err(&self) -> Result<()> {
        Ok(())
    }

    /// Close the cursor. Every later call yields nothing. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        self.pending = None;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn reposition(&mut self) {
        self.pending = None;
        self.exhausted = false;
    }

    fn advance(&mut self, forward: bool) -> Option<KeyValue> {
        if self.closed || self.exhausted {
            return None;
        }

        // hand out the seeked entry first, without moving
        if let Some((key, value)) = self.pending.take() {
            if self.config.missing_prefix(&key) {
                self.exhausted = true;
                return None;
            }
            return Some((key, value));
        }

        match self.step(forward) {
            Some((key, value)) if !self.config.missing_prefix(&key) => Some((key, value)),
            _ => {
                self.exhausted = true;
                None
            }
        }
    }

    fn step(&mut self, forward: bool) -> Option<KeyValue> {
        let position = std::mem::replace(&mut self.position, Position::Unset);
        let found = self
            .tx
            .read(&self.path, |data| {
                let entry = match (&position, forward) {
                    (Position::At(key), true) => data.after(key),
                    (Position::At(key), false) => data.before(key),
                    (Position::AfterEnd, true) | (Position::BeforeStart, false) => None,
                    (Position::Unset | Position::BeforeStart, true) => data.first(),
                    (Position::Unset | Position::AfterEnd, false) => data.last(),
                };
                owned(entry)
            })
            .flatten();

        self.position = match &found {
            Some((key, _)) => Position::At(key.clone()),
            None if forward => Position::AfterEnd,
            None => Position::BeforeStart,
        };
        found
    }
}
