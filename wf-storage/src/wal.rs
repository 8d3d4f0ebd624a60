// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log of domain events.
//!
//! Wire format: a sequence of `(4-byte big-endian length, JSON payload)`
//! records, each payload a [`WalEntry`]. The log is append-only; entries
//! are never rewritten. `processed_seq` tracks how far the materialized
//! state has consumed the log so a restart can resume exactly where it
//! left off without reprocessing an already-applied event.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use wf_core::event::Event;

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("io error on wal at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt wal entry at byte offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

pub struct Wal {
    path: PathBuf,
    file: Mutex<File>,
    entries: Mutex<Vec<WalEntry>>,
    write_seq: AtomicU64,
    processed_seq: AtomicU64,
}

impl Wal {
    /// Opens (creating if absent) the WAL file at `path`, replays every
    /// existing entry into memory, and sets the processed cursor to
    /// `processed_seq` (typically the value recorded in the last
    /// snapshot).
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| WalError::Io {
                path: path.clone(),
                source,
            })?;

        let entries = Self::read_all(&mut file, &path)?;
        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);

        Ok(Self {
            path,
            file: Mutex::new(file),
            entries: Mutex::new(entries),
            write_seq: AtomicU64::new(write_seq),
            processed_seq: AtomicU64::new(processed_seq),
        })
    }

    fn read_all(file: &mut File, path: &Path) -> Result<Vec<WalEntry>, WalError> {
        file.seek(SeekFrom::Start(0)).map_err(|source| WalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file.try_clone().map_err(|source| WalError::Io {
            path: path.to_path_buf(),
            source,
        })?);

        let mut entries = Vec::new();
        let mut offset: u64 = 0;
        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(source) => {
                    return Err(WalError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            reader
                .read_exact(&mut payload)
                .map_err(|source| WalError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            let entry: WalEntry =
                serde_json::from_slice(&payload).map_err(|e| WalError::Corrupt {
                    offset,
                    reason: e.to_string(),
                })?;
            offset += 4 + len as u64;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Appends `event`, returning its assigned sequence number. The append
    /// is a single write of the length-prefixed payload; a crash mid-write
    /// leaves a truncated final record that `open` will surface as
    /// `Corrupt` rather than silently dropping.
    pub fn append(&self, event: Event) -> Result<u64, WalError> {
        let seq = self.write_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = WalEntry { seq, event };
        let payload = serde_json::to_vec(&entry).map_err(|e| WalError::Corrupt {
            offset: 0,
            reason: e.to_string(),
        })?;
        let len = (payload.len() as u32).to_be_bytes();

        let mut file = self.file.lock();
        file.write_all(&len).map_err(|source| WalError::Io {
            path: self.path.clone(),
            source,
        })?;
        file.write_all(&payload).map_err(|source| WalError::Io {
            path: self.path.clone(),
            source,
        })?;
        drop(file);

        self.entries.lock().push(entry);
        Ok(seq)
    }

    pub fn flush(&self) -> Result<(), WalError> {
        self.file.lock().flush().map_err(|source| WalError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// The first entry after `processed_seq`, if any, without advancing
    /// the cursor.
    pub fn next_unprocessed(&self) -> Option<WalEntry> {
        let processed = self.processed_seq.load(Ordering::SeqCst);
        self.entries
            .lock()
            .iter()
            .find(|e| e.seq > processed)
            .cloned()
    }

    /// All entries after `processed_seq`, in order.
    pub fn unprocessed_since(&self, processed_seq: u64) -> Vec<WalEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.seq > processed_seq)
            .cloned()
            .collect()
    }

    pub fn mark_processed(&self, seq: u64) {
        let mut current = self.processed_seq.load(Ordering::SeqCst);
        while seq > current {
            match self.processed_seq.compare_exchange_weak(
                current,
                seq,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq.load(Ordering::SeqCst)
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq.load(Ordering::SeqCst)
    }
}
