//! Append-only queue of undelivered wire records.
//!
//! At any quiescent point the file holds exactly the records accepted but
//! not yet confirmed delivered, in append order. An absent file and a
//! zero-length file both mean "empty".
//!
//! Crash behaviour:
//! - `append` writes the whole line in one call and syncs it. A crash
//!   mid-write leaves at most one unterminated line, which `open` truncates.
//!   A write that fails at runtime is cut back off, and `append` also cuts
//!   any unterminated tail it finds before writing.
//! - `replace` writes a sibling temp file, renames it over the queue and
//!   syncs the directory.
//!
//! The queue is not internally synchronized. The delivery worker is its
//! only writer.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::delivery::wire::WireRecord;

#[derive(Debug)]
pub struct DurableQueue {
    path: PathBuf,
}

impl DurableQueue {
    /// Open the queue at `path`, dropping any torn trailing line.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let queue = Self { path: path.into() };
        queue.recover_torn_tail()?;
        Ok(queue)
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file if needed.
    pub fn append(&self, record: &WireRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create queue directory {:?}", parent))?;
            }
        }

        let mut line = String::with_capacity(record.as_str().len() + 1);
        line.push_str(record.as_str());
        line.push('\n');

        let (mut file, start) = self.open_for_append()?;
        if let Err(e) = file.write_all(line.as_bytes()) {
            if let Err(trunc) = file.set_len(start) {
                warn!("Could not cut partial record from {:?}: {}", self.path, trunc);
            }
            return Err(e).context("failed to append queue record");
        }
        file.sync_data().context("failed to sync queue file")?;

        debug!("Queued record ({} bytes)", line.len());
        Ok(())
    }

    /// All stored records in append order; the file is left untouched.
    pub fn snapshot(&self) -> Result<Vec<WireRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read queue file {:?}", self.path))
            }
        };

        let complete = match content.rfind('\n') {
            Some(idx) => &content[..=idx],
            None => "",
        };
        if complete.len() < content.len() {
            warn!(
                "Ignoring unterminated tail of {:?} ({} bytes)",
                self.path,
                content.len() - complete.len()
            );
        }

        Ok(complete
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(WireRecord::from_stored)
            .collect())
    }

    /// Atomically rewrite the queue to hold exactly `remaining`, in order.
    ///
    /// An empty `remaining` deletes the file.
    pub fn replace(&self, remaining: &[WireRecord]) -> Result<()> {
        if remaining.is_empty() {
            return self.clear();
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("failed to create {:?}", tmp))?;
            for record in remaining {
                file.write_all(record.as_str().as_bytes())?;
                file.write_all(b"\n")?;
            }
            file.sync_all().context("failed to sync rewritten queue")?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move {:?} over {:?}", tmp, self.path))?;
        sync_parent(&self.path)?;

        debug!("Queue rewritten with {} record(s)", remaining.len());
        Ok(())
    }

    /// Delete the backing file. Missing is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to delete {:?}", self.path)),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Open for appending, returning the file and its current length.
    ///
    /// An unterminated tail left by an earlier failed write is cut first so
    /// the new record starts on its own line.
    fn open_for_append(&self) -> Result<(File, u64)> {
        let open = || {
            OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("failed to open queue file {:?}", self.path))
        };

        let mut file = open()?;
        let len = file.metadata().context("failed to stat queue file")?.len();
        if len == 0 {
            return Ok((file, 0));
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))
            .and_then(|_| file.read_exact(&mut last))
            .context("failed to read queue file tail")?;
        if last[0] == b'\n' {
            return Ok((file, len));
        }

        drop(file);
        self.recover_torn_tail()?;
        let file = open()?;
        let len = file.metadata().context("failed to stat queue file")?.len();
        Ok((file, len))
    }

    fn recover_torn_tail(&self) -> Result<()> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read queue file {:?}", self.path))
            }
        };
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            return Ok(());
        }

        let keep = bytes
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |idx| idx + 1);
        warn!(
            "Dropping torn record at end of {:?} ({} bytes)",
            self.path,
            bytes.len() - keep
        );

        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {:?} for repair", self.path))?;
        file.set_len(keep as u64)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Flush the directory entry of `path` so a rename survives power loss.
fn sync_parent(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("failed to sync directory {:?}", dir))
}
