use std::ffi::OsString;
use std::fs::{self, DirBuilder, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use log::debug;
use memmap2::Mmap;

use crate::backend::Backend;
use crate::constants::{
    StoreFlags, DIR_MODE, FILE_MODE, LOCK_RETRY_INTERVAL, LOCK_SUFFIX, OPEN_TIMEOUT, TEMP_SUFFIX,
};
use crate::error::{Error, Result};
use crate::node::BucketData;
use crate::snapshot;

/// Disk-backed backend.
///
/// The committed image lives in a single data file. Exclusive access is
/// granted by a lock on a sibling `<path>.lock` file, so commits can replace
/// the data file atomically (write `<path>.tmp`, sync, rename) without losing
/// the lock.
#[derive(Debug)]
pub struct FileBackend {
    /// Path to the data file
    path: PathBuf,
    /// Printable form of `path`
    location: String,
    /// Store flags
    flags: StoreFlags,
    /// Held while the backend is acquired
    lock_file: Option<File>,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>, flags: StoreFlags) -> Self {
        let path = path.as_ref().to_path_buf();
        FileBackend {
            location: path.display().to_string(),
            path,
            flags,
            lock_file: None,
        }
    }

    /// Path to the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        sibling(&self.path, LOCK_SUFFIX)
    }

    fn is_readonly(&self) -> bool {
        self.flags.contains(StoreFlags::RDONLY)
    }

    /// Ensure the directory holding the data file exists
    fn ensure_dir(&self) -> Result<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                DirBuilder::new()
                    .recursive(true)
                    .mode(DIR_MODE)
                    .create(dir)
                    .map_err(|e| {
                        Error::Io(io::Error::new(
                            e.kind(),
                            format!("unable to create directory {}: {}", dir.display(), e),
                        ))
                    })
            }
            _ => Ok(()),
        }
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Make the rename of a freshly persisted image durable
    fn sync_dir(&self) -> Result<()> {
        File::open(self.dir())?.sync_all()?;
        Ok(())
    }

    /// Open the file to lock, creating the lock file unless read-only.
    ///
    /// A read-only backend never creates anything: without a lock file it
    /// locks the data file itself.
    fn open_lock(&self) -> Result<(File, PathBuf)> {
        let lock_path = self.lock_path();
        if !self.is_readonly() {
            let lock = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(FILE_MODE)
                .open(&lock_path)?;
            return Ok((lock, lock_path));
        }

        match File::open(&lock_path) {
            Ok(lock) => Ok((lock, lock_path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok((File::open(&self.path)?, self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Map the data file and hand out its contents
    fn read_image(&self) -> Result<Option<Bytes>> {
        let file = File::open(&self.path)?;
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }
        // The data file is only ever replaced by rename, never written in place,
        // so the mapping stays stable for as long as it is alive.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Some(Bytes::from_owner(map)))
    }
}

impl Backend for FileBackend {
    fn location(&self) -> &str {
        &self.location
    }

    fn acquire(&mut self) -> Result<Option<Bytes>> {
        if self.lock_file.is_some() {
            return Err(Error::AlreadyOpen);
        }

        if !self.is_readonly() {
            self.ensure_dir()?;
        }

        let (lock, lock_path) = self.open_lock()?;
        lock_with_timeout(&lock, &self.path)?;

        let image = match fs::metadata(&self.path) {
            Ok(_) => self.read_image()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !self.is_readonly() => {
                debug!("creating data file {}", self.location);
                self.persist(&snapshot::encode(&BucketData::new())?)?;
                None
            }
            Err(e) => return Err(e.into()),
        };

        self.lock_file = Some(lock);
        debug!("acquired lock {}", lock_path.display());
        Ok(image)
    }

    fn persist(&mut self, image: &[u8]) -> Result<()> {
        if self.is_readonly() {
            return Err(Error::StoreReadOnly);
        }

        let tmp = sibling(&self.path, TEMP_SUFFIX);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(&tmp)?;
        file.write_all(image)?;
        if !self.flags.contains(StoreFlags::NOSYNC) {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&tmp, &self.path)?;
        if !self.flags.contains(StoreFlags::NOSYNC) {
            self.sync_dir()?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(lock) = self.lock_file.take() {
            lock.unlock()?;
            debug!("released lock on {}", self.location);
        }
        Ok(())
    }
}

/// Poll for an exclusive lock until `OPEN_TIMEOUT` elapses
fn lock_with_timeout(lock: &File, path: &Path) -> Result<()> {
    let deadline = Instant::now() + OPEN_TIMEOUT;
    loop {
        match lock.try_lock() {
            Ok(()) => return Ok(()),
            Err(TryLockError::WouldBlock) => {}
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        if Instant::now() >= deadline {
            return Err(Error::LockTimeout(path.to_path_buf()));
        }
        thread::sleep(LOCK_RETRY_INTERVAL);
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
