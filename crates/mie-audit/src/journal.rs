//! Durable JSONL journal shared by both store backends.
//!
//! One event per line, newline terminated. Appends are serialized twice: by
//! an in-process mutex and by an exclusive `flock` on the file, so separate
//! handles (and processes) on one store never assign the same id. Under the
//! lock each handle first catches up with records other handles appended,
//! then assigns id, timestamp and chain hash, writes and `fsync`s. Readers
//! only ever see bytes up to the committed length, which is advanced after
//! the write is durable.

use crate::entry::{AuditEvent, NewAuditEvent, GENESIS_HASH};
use crate::error::{AuditError, Result};
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Take, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Location of one committed record in the journal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub offset: u64,
    pub len: u64,
    /// 1-indexed line number, for error reporting.
    pub line: usize,
}

struct Writer {
    file: File,
    next_id: u64,
    next_line: usize,
    last_hash: String,
    last_created_at: Option<DateTime<Utc>>,
    poisoned: bool,
}

pub(crate) struct Journal {
    path: PathBuf,
    writer: Mutex<Writer>,
    committed: AtomicU64,
}

impl Journal {
    /// Open or create the journal at `path`, calling `visit` for every
    /// committed record in file order.
    ///
    /// A trailing record without its newline was never acknowledged; it is
    /// truncated away. A complete line that does not parse is an error.
    pub(crate) fn open(path: &Path, mut visit: impl FnMut(&AuditEvent, Slot)) -> Result<Self> {
        let created = !path.exists();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::write(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| AuditError::write(path, e))?;

        if created {
            sync_parent_dir(path)?;
        }

        let journal = Journal {
            path: path.to_path_buf(),
            writer: Mutex::new(Writer {
                file,
                next_id: 1,
                next_line: 1,
                last_hash: GENESIS_HASH.to_string(),
                last_created_at: None,
                poisoned: false,
            }),
            committed: AtomicU64::new(0),
        };

        {
            let mut writer = journal.writer.lock().map_err(|_| AuditError::LockPoisoned)?;
            let _lock = FileLock::acquire(path, &writer.file, LockMode::Exclusive)?;
            journal.catch_up(&mut writer, &mut visit, true)?;
            debug!(
                path = %path.display(),
                events = writer.next_id - 1,
                bytes = journal.committed_len(),
                "audit journal opened"
            );
        }

        Ok(journal)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes visible to readers.
    pub(crate) fn committed_len(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }

    /// Assign id, timestamp and chain hash, write the record and `fsync`.
    ///
    /// `visit` runs under the writer lock for every record that becomes
    /// visible to this handle: first those appended through other handles
    /// since the last catch-up, then the new record once it is durable. It
    /// runs before the committed length moves past the record.
    pub(crate) fn append(
        &self,
        new: NewAuditEvent,
        mut visit: impl FnMut(&AuditEvent, Slot),
    ) -> Result<AuditEvent> {
        let mut writer = self.writer.lock().map_err(|_| AuditError::LockPoisoned)?;
        if writer.poisoned {
            return Err(AuditError::Poisoned {
                path: self.path.clone(),
            });
        }
        let _lock = FileLock::acquire(&self.path, &writer.file, LockMode::Exclusive)?;
        self.catch_up(&mut writer, &mut visit, true)?;

        let following = writer
            .next_id
            .checked_add(1)
            .ok_or_else(|| AuditError::Integrity {
                message: "event id space exhausted".to_string(),
            })?;

        let now = Utc::now();
        let created_at = match writer.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };

        let mut event = AuditEvent::assign(new, writer.next_id, created_at, &writer.last_hash);
        event.compute_hash()?;
        let bytes = event.to_jsonl()?;

        let offset = self.committed.load(Ordering::Acquire);
        let written = writer
            .file
            .write_all(&bytes)
            .and_then(|()| writer.file.sync_data());

        if let Err(source) = written {
            error!(
                path = %self.path.display(),
                event_id = event.event_id,
                error = %source,
                "audit append failed"
            );
            let rolled_back = writer
                .file
                .set_len(offset)
                .and_then(|()| writer.file.sync_data());
            if let Err(rollback) = rolled_back {
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "audit rollback failed; refusing further appends"
                );
                writer.poisoned = true;
            }
            return Err(AuditError::write(&self.path, source));
        }

        let slot = Slot {
            offset,
            len: bytes.len() as u64,
            line: writer.next_line,
        };
        visit(&event, slot);

        writer.next_id = following;
        writer.next_line += 1;
        writer.last_hash = event.hash().to_string();
        writer.last_created_at = Some(created_at);
        self.committed
            .store(offset + slot.len, Ordering::Release);

        info!(
            event_id = event.event_id,
            request_id = %event.request_id,
            event_type = %event.event_type,
            "audit event appended"
        );

        Ok(event)
    }

    /// Pick up records appended through other handles, calling `visit` for
    /// each in file order.
    pub(crate) fn refresh(&self, mut visit: impl FnMut(&AuditEvent, Slot)) -> Result<()> {
        let mut writer = self.writer.lock().map_err(|_| AuditError::LockPoisoned)?;
        let _lock = FileLock::acquire(&self.path, &writer.file, LockMode::Shared)?;
        self.catch_up(&mut writer, &mut visit, false)
    }

    /// Read complete records past the committed length and advance the chain
    /// state over them. Must run with the file lock held.
    ///
    /// With `repair`, a torn trailing record is truncated away; otherwise
    /// it is left for the next writer.
    fn catch_up(
        &self,
        writer: &mut Writer,
        visit: &mut dyn FnMut(&AuditEvent, Slot),
        repair: bool,
    ) -> Result<()> {
        let path = self.path.as_path();
        let start = self.committed.load(Ordering::Acquire);
        let file = File::open(path).map_err(|e| AuditError::read(path, e))?;
        let len = file.metadata().map_err(|e| AuditError::read(path, e))?.len();
        if len == start {
            return Ok(());
        }
        if len < start {
            return Err(AuditError::Integrity {
                message: format!("audit journal shrank from {start} to {len} bytes"),
            });
        }

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(start))
            .map_err(|e| AuditError::read(path, e))?;
        let mut buf = Vec::new();
        let mut offset = start;

        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| AuditError::read(path, e))?;
            if n == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') {
                if repair {
                    warn!(
                        path = %path.display(),
                        offset,
                        bytes = n,
                        "truncating torn trailing audit record"
                    );
                    writer
                        .file
                        .set_len(offset)
                        .and_then(|()| writer.file.sync_data())
                        .map_err(|e| AuditError::write(path, e))?;
                } else {
                    debug!(path = %path.display(), offset, "ignoring torn trailing audit record");
                }
                break;
            }

            let line = writer.next_line;
            writer.next_line += 1;
            let slot = Slot {
                offset,
                len: n as u64,
                line,
            };
            offset += n as u64;

            if buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let event = parse_line(path, line, &buf)?;
            if event.event_id < writer.next_id {
                return Err(AuditError::Integrity {
                    message: format!(
                        "event id {} at line {} is not greater than the previous id {}",
                        event.event_id,
                        line,
                        writer.next_id - 1
                    ),
                });
            }
            let next_id = event
                .event_id
                .checked_add(1)
                .ok_or_else(|| AuditError::Integrity {
                    message: format!("event id {} at line {} exhausts the id space", event.event_id, line),
                })?;

            visit(&event, slot);
            writer.next_id = next_id;
            writer.last_hash = event.hash().to_string();
            writer.last_created_at = Some(event.created_at);
        }

        self.committed.store(offset, Ordering::Release);
        Ok(())
    }

    /// Lazy reader over every committed record, from the start of the file.
    pub(crate) fn lines(&self) -> Result<JournalLines> {
        let limit = self.committed_len();
        let file = File::open(&self.path).map_err(|e| AuditError::read(&self.path, e))?;
        Ok(JournalLines {
            path: self.path.clone(),
            reader: BufReader::new(file.take(limit)),
            buf: Vec::new(),
            line: 0,
            done: false,
        })
    }

    /// Random-access reader for records located by [`Slot`].
    pub(crate) fn slot_reader(&self) -> Result<SlotReader> {
        let file = File::open(&self.path).map_err(|e| AuditError::read(&self.path, e))?;
        Ok(SlotReader {
            path: self.path.clone(),
            file,
            buf: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Advisory `flock` on the journal file, released on drop.
///
/// Held on a duplicate of the writer's descriptor; both share one open file
/// description, so the lock covers the writer too.
struct FileLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: File,
}

impl FileLock {
    fn acquire(path: &Path, file: &File, mode: LockMode) -> Result<Self> {
        let fail = |e: std::io::Error| match mode {
            LockMode::Shared => AuditError::read(path, e),
            LockMode::Exclusive => AuditError::write(path, e),
        };
        let file = file.try_clone().map_err(fail)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let op = match mode {
                LockMode::Shared => libc::LOCK_SH,
                LockMode::Exclusive => libc::LOCK_EX,
            };
            loop {
                // Blocking lock; retried when interrupted by a signal.
                let result = unsafe { libc::flock(file.as_raw_fd(), op) };
                if result == 0 {
                    break;
                }
                let err = std::io::Error::last_os_error();
                if err.kind() != std::io::ErrorKind::Interrupted {
                    return Err(fail(err));
                }
            }
        }

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

fn parse_line(path: &Path, line: usize, bytes: &[u8]) -> Result<AuditEvent> {
    serde_json::from_slice(bytes).map_err(|source| AuditError::Parse {
        path: path.to_path_buf(),
        line,
        source,
    })
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| AuditError::write(parent, e)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

/// Sequential iterator over committed records. Stops after the first error.
pub(crate) struct JournalLines {
    path: PathBuf,
    reader: BufReader<Take<File>>,
    buf: Vec<u8>,
    line: usize,
    done: bool,
}

impl Iterator for JournalLines {
    type Item = Result<AuditEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line += 1;
                    if self.buf.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let parsed = parse_line(&self.path, self.line, &self.buf);
                    self.done = parsed.is_err();
                    return Some(parsed);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(AuditError::read(&self.path, e)));
                }
            }
        }
        None
    }
}

pub(crate) struct SlotReader {
    path: PathBuf,
    file: File,
    buf: Vec<u8>,
}

impl SlotReader {
    pub(crate) fn read(&mut self, slot: Slot) -> Result<AuditEvent> {
        self.buf.resize(slot.len as usize, 0);
        self.file
            .seek(SeekFrom::Start(slot.offset))
            .and_then(|_| self.file.read_exact(&mut self.buf))
            .map_err(|e| AuditError::read(&self.path, e))?;
        parse_line(&self.path, slot.line, &self.buf)
    }
}
