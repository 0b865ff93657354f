//! Durable ledger journal
//!
//! # Format
//!
//! One JSON-encoded `LedgerEntry` per line, in sequence order, each record
//! terminated by `\n`. Records are only ever appended. A trailing record
//! without its terminator is an interrupted write and is ignored on read;
//! an unparseable record before the tail is corruption. So is a record that
//! parses but is not byte-identical to the encoding of what it parses to
//! (a re-cased UUID or timestamp separator, for instance).
//!
//! Each append is followed by `sync_data` when `sync_on_append` is set, so
//! a returned sequence number implies the record reached disk. A failed
//! write is rolled back by truncating to the previous length.

use crate::types::LedgerEntry;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only journal writer
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    sync_on_append: bool,
    len: u64,
}

/// Records read back from a journal
#[derive(Debug, Clone)]
pub struct JournalContents {
    /// Complete records in file order
    pub entries: Vec<LedgerEntry>,

    /// Bytes of an incomplete trailing record that were ignored
    pub discarded_tail_bytes: usize,
}

impl Journal {
    /// Create a new journal; refuses to reuse an existing file
    pub fn create(path: impl AsRef<Path>, sync_on_append: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;

        tracing::info!(path = %path.display(), sync_on_append, "Custody journal created");

        Ok(Self {
            path,
            file,
            sync_on_append,
            len: 0,
        })
    }

    /// Journal location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&mut self, entry: &LedgerEntry) -> Result<()> {
        let mut record = serde_json::to_vec(entry)?;
        record.push(b'\n');

        if let Err(e) = self.write_record(&record) {
            // Drop any partial bytes so the next append starts on a record boundary
            if let Err(rollback) = self.file.set_len(self.len) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Failed to roll back partial journal record"
                );
            }
            return Err(e);
        }

        self.len += record.len() as u64;

        tracing::debug!(
            sequence_number = entry.sequence_number,
            event_type = %entry.event_type,
            bytes = record.len(),
            "Journal record appended"
        );

        Ok(())
    }

    fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.file.write_all(record)?;
        self.file.flush()?;
        if self.sync_on_append {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Read every complete record from a journal file
    pub fn read(path: impl AsRef<Path>) -> Result<JournalContents> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        parse_records(&bytes, path)
    }
}

fn parse_records(bytes: &[u8], path: &Path) -> Result<JournalContents> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let Some(newline) = bytes[offset..].iter().position(|b| *b == b'\n') else {
            let discarded = bytes.len() - offset;
            tracing::warn!(
                path = %path.display(),
                discarded_bytes = discarded,
                complete_records = entries.len(),
                "Ignoring truncated trailing journal record"
            );
            return Ok(JournalContents {
                entries,
                discarded_tail_bytes: discarded,
            });
        };

        let record = &bytes[offset..offset + newline];
        let corrupted = |reason: String| {
            Error::Verification(format!(
                "journal {} record {} is corrupted: {}",
                path.display(),
                entries.len(),
                reason
            ))
        };

        let entry: LedgerEntry =
            serde_json::from_slice(record).map_err(|e| corrupted(e.to_string()))?;
        if serde_json::to_vec(&entry)? != record {
            return Err(corrupted("record is not in canonical form".to_string()));
        }

        entries.push(entry);
        offset += newline + 1;
    }

    Ok(JournalContents {
        entries,
        discarded_tail_bytes: 0,
    })
}
