use std::io;
use std::path::PathBuf;
use std::result;

use thiserror::Error;

/// Custom result type for store operations
pub type Result<T> = result::Result<T, Error>;

/// Store error codes
#[derive(Debug, Error)]
pub enum Error {
    /// The backing resource could not be created, opened or written
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Exclusive access to the backing resource was not granted in time
    #[error("timed out acquiring exclusive access to {}", .0.display())]
    LockTimeout(PathBuf),
    /// No matching key/value pair found
    #[error("Key not found")]
    KeyNotFound,
    /// Mutation attempted in a read-only transaction
    #[error("Transaction is not writable")]
    TxNotWritable,
    /// Write transaction requested on a store opened read-only
    #[error("Store is read-only")]
    StoreReadOnly,
    /// Seek key lies outside the cursor's prefix
    #[error("seek bytes {:?} not prefixed with {:?}", String::from_utf8_lossy(.seek), String::from_utf8_lossy(.prefix))]
    SeekPrefixMismatch { seek: Vec<u8>, prefix: Vec<u8> },
    /// Bucket does not exist
    #[error("Bucket not found: {:?}", String::from_utf8_lossy(.0))]
    BucketNotFound(Vec<u8>),
    /// Bucket already exists
    #[error("Bucket already exists: {:?}", String::from_utf8_lossy(.0))]
    BucketExists(Vec<u8>),
    /// Bucket name is empty
    #[error("Bucket name required")]
    BucketNameRequired,
    /// Key is empty
    #[error("Key required")]
    KeyRequired,
    /// Bucket would be nested deeper than `MAX_DEPTH`
    #[error("Bucket nesting deeper than {0} levels")]
    NestingTooDeep(usize),
    /// Key, value or bucket too large for the snapshot format
    #[error("Entry too large: {0} exceeds the snapshot length limit")]
    EntryTooLarge(usize),
    /// Value operation on a key holding a nested bucket
    #[error("Incompatible value: key holds a nested bucket")]
    IncompatibleValue,
    /// Store is not open
    #[error("Store is closed")]
    StoreClosed,
    /// Store is already open
    #[error("Store is already open")]
    AlreadyOpen,
    /// Input is not a snapshot image
    #[error("Not a valid snapshot image")]
    Invalid,
    /// Snapshot image is damaged
    #[error("Snapshot image is corrupted: {0}")]
    Corrupted(&'static str),
    /// Snapshot format version mismatch
    #[error("Snapshot version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

/// Coarse classification of [`Error`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    IoFailure,
    KeyNotFound,
    TxNotWritable,
    SeekPrefixMismatch,
    BucketNotFound,
    InvalidArgument,
    Lifecycle,
    Format,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::LockTimeout(_) => ErrorKind::IoFailure,
            Error::KeyNotFound => ErrorKind::KeyNotFound,
            Error::TxNotWritable | Error::StoreReadOnly => ErrorKind::TxNotWritable,
            Error::SeekPrefixMismatch { .. } => ErrorKind::SeekPrefixMismatch,
            Error::BucketNotFound(_) => ErrorKind::BucketNotFound,
            Error::BucketExists(_)
            | Error::BucketNameRequired
            | Error::KeyRequired
            | Error::IncompatibleValue
            | Error::NestingTooDeep(_)
            | Error::EntryTooLarge(_) => ErrorKind::InvalidArgument,
            Error::StoreClosed | Error::AlreadyOpen => ErrorKind::Lifecycle,
            Error::Invalid | Error::Corrupted(_) | Error::VersionMismatch { .. } => {
                ErrorKind::Format
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound)
    }

    pub fn is_not_writable(&self) -> bool {
        self.kind() == ErrorKind::TxNotWritable
    }
}
