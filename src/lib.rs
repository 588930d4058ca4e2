//! Embedded transactional key-value store.
//!
//! Data is organised in named buckets holding byte keys and values, kept in
//! byte-lexicographic order. Buckets nest. All access happens inside a
//! transaction scoped to a closure: [`Store::view`] for reads,
//! [`Store::update`] for writes. Within a bucket, [`Cursor`]s iterate in
//! either direction, optionally constrained to a key prefix.
//!
//! State is persisted by a [`Backend`]: [`FileBackend`] keeps it in a single
//! locked file, [`MemoryBackend`] in process memory.

mod backend;
mod bucket;
mod constants;
mod context;
mod cursor;
mod error;
mod file;
mod node;
mod snapshot;
mod store;
mod transaction;
mod types;

pub use backend::{Backend, MemoryBackend};
pub use bucket::Bucket;
pub use constants::{
    StoreFlags, MAX_DEPTH, MAX_ENTRY_LEN, OPEN_TIMEOUT, SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};
pub use context::TraceContext;
pub use cursor::Cursor;
pub use error::{Error, ErrorKind, Result};
pub use file::FileBackend;
pub use store::Store;
pub use transaction::Transaction;
pub use types::{CursorConfig, CursorHint, CursorOption, Direction, KeyValue};
