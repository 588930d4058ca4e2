use bitflags::bitflags;
use std::time::Duration;

// Store flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StoreFlags: u32 {
        /// Skip fsync after persisting a commit
        const NOSYNC = 0x10000;
        /// Never accept write transactions, never create the resource
        const RDONLY = 0x20000;
    }
}

// Transaction flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct TxFlags: u32 {
        // Reuse store flags
        const RDONLY = StoreFlags::RDONLY.bits();

        // Transaction-specific flags
        const DIRTY = 0x04;
    }
}

/// How long `Store::open` waits for exclusive access to the backing resource
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(1);
/// Pause between two attempts to take the lock
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Permissions of directories created on open
pub const DIR_MODE: u32 = 0o700;
/// Permissions of the data file created on open
pub const FILE_MODE: u32 = 0o600;

/// Suffix of the lock file guarding a data file
pub const LOCK_SUFFIX: &str = "lock";
/// Suffix of the scratch file a commit is written to before replacing the data file
pub const TEMP_SUFFIX: &str = "tmp";

/// Magic number for snapshot images ("LKV" + 0x01)
pub const SNAPSHOT_MAGIC: u32 = 0x4C4B_5601;
/// Snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Deepest bucket nesting accepted, counting top-level buckets as depth 1
pub const MAX_DEPTH: usize = 64;
/// Largest key, value or entry count a snapshot image can frame
pub const MAX_ENTRY_LEN: usize = u32::MAX as usize;

/// Entry tag for a plain value
pub(crate) const TAG_VALUE: u8 = 0;
/// Entry tag for a nested bucket
pub(crate) const TAG_BUCKET: u8 = 1;
