//! Durable backing stores for the ledger.
//!
//! A store only knows about opaque one-line records. It never interprets
//! them; chaining and ordering belong to the writer.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// How long an append waits for another writer to release the ledger.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bytes read per step when scanning backwards for the last record.
const TAIL_CHUNK: u64 = 4096;

/// Append-only record storage.
///
/// `append` is only called between `acquire` and `release`. `records` may be
/// called concurrently with `append` and must never return a record that is
/// only partially written.
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    /// Where the records live, for error messages.
    fn location(&self) -> &Path;

    /// Take the cross-process write lock. Stores with a single in-process
    /// owner need no lock.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`ErrorKind::WouldBlock`] if another writer
    /// kept the lock past the store's timeout.
    fn acquire(&self) -> std::io::Result<()> {
        Ok(())
    }

    /// Release the lock taken by [`LedgerStore::acquire`].
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the lock could not be released.
    fn release(&self) -> std::io::Result<()> {
        Ok(())
    }

    /// Durably append one record (without its terminator).
    ///
    /// Either the whole record is stored or nothing is.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the record could not be made durable.
    fn append(&self, record: &str) -> std::io::Result<()>;

    /// Snapshot of all complete records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the records could not be read.
    fn records(&self) -> std::io::Result<Vec<String>>;

    /// The most recently stored record.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the records could not be read.
    fn last_record(&self) -> std::io::Result<Option<String>> {
        Ok(self.records()?.pop())
    }
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn location(&self) -> &Path {
        (**self).location()
    }

    fn acquire(&self) -> std::io::Result<()> {
        (**self).acquire()
    }

    fn release(&self) -> std::io::Result<()> {
        (**self).release()
    }

    fn append(&self, record: &str) -> std::io::Result<()> {
        (**self).append(record)
    }

    fn records(&self) -> std::io::Result<Vec<String>> {
        (**self).records()
    }

    fn last_record(&self) -> std::io::Result<Option<String>> {
        (**self).last_record()
    }
}

/// Line-delimited JSON file shared between processes.
///
/// Writers serialize on an exclusive advisory lock taken per append, so
/// `list` or `verify` can record their entries while an ingest is running.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
    lock_timeout: Duration,
}

impl FileStore {
    /// Open or create the ledger file.
    ///
    /// A trailing record without its terminator (a write torn by a crash) is
    /// cut off before the store is handed out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerLocked`] if another writer holds the ledger
    /// past the default lock timeout, or an I/O error if it cannot be opened
    /// or repaired.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_LOCK_TIMEOUT)
    }

    /// Open or create the ledger file, waiting at most `lock_timeout` for
    /// other writers on every append.
    ///
    /// # Errors
    ///
    /// Same as [`FileStore::open`].
    pub fn open_with_timeout(path: impl AsRef<Path>, lock_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let store = Self {
            path,
            file,
            lock_timeout,
        };
        store
            .acquire()
            .map_err(|e| Error::ledger_lock(&store.path, e))?;
        store.release()?;
        info!("Ledger opened at {}", store.path.display());
        Ok(store)
    }

    /// Read the complete records of a ledger file without taking the lock.
    ///
    /// Used by read-only tools that run alongside the writer.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read.
    pub fn read_records(path: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;

        // A record still being written has no terminator yet.
        Ok(contents
            .split_inclusive('\n')
            .filter_map(|line| line.strip_suffix('\n'))
            .map(str::to_string)
            .collect())
    }

    #[cfg(test)]
    fn from_file(path: PathBuf, file: File) -> Self {
        Self {
            path,
            file,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    fn repair_torn_tail(&self) -> std::io::Result<()> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        let mut reader = &self.file;
        reader.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        reader.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let mut contents = Vec::new();
        reader.seek(SeekFrom::Start(0))?;
        reader.read_to_end(&mut contents)?;
        let keep = contents
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);

        warn!(
            "Truncating torn ledger record at {} ({} bytes)",
            self.path.display(),
            contents.len() - keep
        );
        self.file.set_len(keep as u64)?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl LedgerStore for FileStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn acquire(&self) -> std::io::Result<()> {
        let deadline = Instant::now() + self.lock_timeout;
        let contended = fs2::lock_contended_error().raw_os_error();

        loop {
            match self.file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.raw_os_error() == contended => {
                    if Instant::now() >= deadline {
                        return Err(std::io::Error::new(
                            ErrorKind::WouldBlock,
                            "ledger lock wait timed out",
                        ));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }

        // A writer that crashed mid-record left its tail for us.
        if let Err(e) = self.repair_torn_tail() {
            let _ = FileExt::unlock(&self.file);
            return Err(e);
        }
        Ok(())
    }

    fn release(&self) -> std::io::Result<()> {
        FileExt::unlock(&self.file)
    }

    fn append(&self, record: &str) -> std::io::Result<()> {
        let before = self.file.metadata()?.len();

        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');

        let written = (&self.file)
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_data());

        if let Err(err) = written {
            if let Err(trunc) = self.file.set_len(before) {
                warn!(
                    "Could not roll back partial ledger write at {}: {trunc}",
                    self.path.display()
                );
            }
            return Err(err);
        }

        debug!("Appended {} byte record", line.len());
        Ok(())
    }

    fn records(&self) -> std::io::Result<Vec<String>> {
        Self::read_records(&self.path)
    }

    fn last_record(&self) -> std::io::Result<Option<String>> {
        let mut reader = &self.file;
        let mut start = reader.seek(SeekFrom::End(0))?;
        let mut tail: Vec<u8> = Vec::new();

        loop {
            let chunk_start = start.saturating_sub(TAIL_CHUNK);
            reader.seek(SeekFrom::Start(chunk_start))?;
            let mut chunk = Vec::new();
            reader.take(start - chunk_start).read_to_end(&mut chunk)?;
            chunk.extend_from_slice(&tail);
            tail = chunk;
            start = chunk_start;

            // Bytes after the last terminator are a record still being written.
            let Some(end) = tail.iter().rposition(|&b| b == b'\n') else {
                if start == 0 {
                    return Ok(None);
                }
                continue;
            };
            let begin = match tail[..end].iter().rposition(|&b| b == b'\n') {
                Some(pos) => pos + 1,
                None if start == 0 => 0,
                None => continue,
            };

            return String::from_utf8(tail[begin..end].to_vec())
                .map(Some)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e));
        }
    }
}

/// In-process store with the same contract as [`FileStore`].
///
/// Useful for tests and for embedding the ledger where persistence is
/// handled elsewhere. Write failures can be injected to exercise the
/// failure path of callers.
#[derive(Debug)]
pub struct MemoryStore {
    records: Mutex<Vec<String>>,
    /// Appends left before writes start failing; `usize::MAX` never fails.
    writes_left: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_records(Vec::new())
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with records.
    #[must_use]
    pub fn with_records(records: Vec<String>) -> Self {
        Self {
            records: Mutex::new(records),
            writes_left: AtomicUsize::new(usize::MAX),
        }
    }

    /// Make every subsequent append fail as if the disk were full.
    pub fn fail_writes(&self, fail: bool) {
        let left = if fail { 0 } else { usize::MAX };
        self.writes_left.store(left, Ordering::SeqCst);
    }

    /// Let the next `writes` appends succeed, then fail every one after.
    pub fn fail_after(&self, writes: usize) {
        self.writes_left.store(writes, Ordering::SeqCst);
    }
}

impl LedgerStore for MemoryStore {
    fn location(&self) -> &Path {
        Path::new(":memory:")
    }

    fn append(&self, record: &str) -> std::io::Result<()> {
        let allowed = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(left),
                n => Some(n - 1),
            });
        if allowed.is_err() {
            return Err(std::io::Error::new(
                ErrorKind::Other,
                "simulated write failure",
            ));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.to_string());
        Ok(())
    }

    fn records(&self) -> std::io::Result<Vec<String>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn last_record(&self) -> std::io::Result<Option<String>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned())
    }
}
