use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use super::types::{FinishRecord, FinishSource, UNASSIGNED_BIB};
use crate::error::{RaceError, RaceResult};

/// One line of the results journal
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalEntry {
    Finish(FinishRecord),
    Correction { sequence: u64, bib: u32 },
}

/// Append-only, strictly ordered finish records for one heat.
///
/// When backed by a file, every append and correction is written as a JSON
/// line and synced to disk before the in-memory view changes, so a failed
/// write never consumes a sequence number. A write that fails part way is
/// cut back to the last committed line; if even that fails the store is
/// poisoned and refuses further writes until it is reopened.
#[derive(Debug)]
pub struct ResultsStore {
    heat: u32,
    records: Vec<FinishRecord>,
    journal: Option<File>,
    path: Option<PathBuf>,
    /// Journal length after the last write that succeeded
    committed: u64,
    poisoned: bool,
    read_only: bool,
}

impl ResultsStore {
    /// A store with no durable backing (tests, dry runs)
    pub fn in_memory(heat: u32) -> Self {
        Self {
            heat,
            records: Vec::new(),
            journal: None,
            path: None,
            committed: 0,
            poisoned: false,
            read_only: false,
        }
    }

    /// Open or create the journal at `path`, replaying what is already there
    pub fn open(path: &Path, heat: u32) -> RaceResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open results journal at {}", path.display()))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read results journal at {}", path.display()))?;

        // A crash mid-write can leave an unterminated final line; drop it so the
        // next append starts on a clean line.
        let committed_len = content.rfind('\n').map(|i| i + 1).unwrap_or(0);
        if committed_len < content.len() {
            warn!(
                path = %path.display(),
                bytes = content.len() - committed_len,
                "discarding torn trailing journal line"
            );
            file.set_len(committed_len as u64)
                .context("Failed to truncate torn journal line")?;
        }

        let mut store = Self {
            heat,
            records: Vec::new(),
            journal: None,
            path: Some(path.to_path_buf()),
            committed: committed_len as u64,
            poisoned: false,
            read_only: false,
        };

        store.replay_lines(&content[..committed_len], path)?;

        debug!(heat, records = store.records.len(), "results journal replayed");
        store.journal = Some(file);
        Ok(store)
    }

    fn replay_lines(&mut self, committed: &str, path: &Path) -> anyhow::Result<()> {
        for (line_no, line) in committed.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = serde_json::from_str(line).with_context(|| {
                format!("Corrupt journal line {} in {}", line_no + 1, path.display())
            })?;
            self.replay(entry).with_context(|| {
                format!("Inconsistent journal line {} in {}", line_no + 1, path.display())
            })?;
        }
        Ok(())
    }

    fn replay(&mut self, entry: JournalEntry) -> anyhow::Result<()> {
        match entry {
            JournalEntry::Finish(record) => {
                if record.sequence != self.next_sequence() {
                    anyhow::bail!(
                        "expected sequence {}, found {}",
                        self.next_sequence(),
                        record.sequence
                    );
                }
                self.records.push(record);
            }
            JournalEntry::Correction { sequence, bib } => {
                let record = self
                    .records
                    .iter_mut()
                    .find(|r| r.sequence == sequence)
                    .ok_or_else(|| anyhow::anyhow!("correction for unknown sequence {}", sequence))?;
                record.bib = bib;
            }
        }
        Ok(())
    }

    /// Load the journal at `path` without opening it for writing.
    ///
    /// A missing journal is an empty heat and an unterminated final line is
    /// skipped, not truncated. Every write on the returned store fails.
    pub fn load(path: &Path, heat: u32) -> RaceResult<Self> {
        let mut store = Self {
            heat,
            records: Vec::new(),
            journal: None,
            path: Some(path.to_path_buf()),
            committed: 0,
            poisoned: false,
            read_only: true,
        };
        if !path.exists() {
            return Ok(store);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read results journal at {}", path.display()))?;
        let committed_len = content.rfind('\n').map(|i| i + 1).unwrap_or(0);
        store.replay_lines(&content[..committed_len], path)?;
        store.committed = committed_len as u64;
        Ok(store)
    }

    pub fn heat(&self) -> u32 {
        self.heat
    }

    /// True once a write could not be undone; every later write is refused
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn records(&self) -> &[FinishRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, sequence: u64) -> Option<&FinishRecord> {
        // Sequences are gapless from 1, so the index is known.
        let idx = usize::try_from(sequence.checked_sub(1)?).ok()?;
        self.records.get(idx)
    }

    /// First finish recorded under `bib`, if any
    pub fn finish_for_bib(&self, bib: u32) -> Option<&FinishRecord> {
        self.records.iter().find(|r| r.bib == bib)
    }

    pub fn next_sequence(&self) -> u64 {
        self.records.last().map(|r| r.sequence + 1).unwrap_or(1)
    }

    /// Append a finish with the next sequence number. Durable before it returns.
    pub fn append(
        &mut self,
        bib: u32,
        elapsed_ms: u64,
        source: FinishSource,
    ) -> RaceResult<FinishRecord> {
        let record = FinishRecord {
            sequence: self.next_sequence(),
            bib,
            elapsed_ms,
            heat: self.heat,
            source,
        };
        self.write_entry(&JournalEntry::Finish(record.clone()))?;
        self.records.push(record.clone());
        Ok(record)
    }

    /// Reassign the bib of an existing record.
    ///
    /// Fails with `CorrectionConflict` when `new_bib` already owns a different
    /// finish in this heat; both records are left untouched in that case.
    /// Returns the bib the record had before.
    pub fn correct(&mut self, sequence: u64, new_bib: u32) -> RaceResult<u32> {
        let previous = self.get(sequence).ok_or(RaceError::NotFound(sequence))?.bib;

        if new_bib != UNASSIGNED_BIB {
            if let Some(existing) = self
                .records
                .iter()
                .find(|r| r.bib == new_bib && r.sequence != sequence)
            {
                return Err(RaceError::CorrectionConflict {
                    bib: new_bib,
                    existing: existing.sequence,
                });
            }
        }

        if previous == new_bib {
            return Ok(previous);
        }

        self.write_entry(&JournalEntry::Correction {
            sequence,
            bib: new_bib,
        })?;
        if let Some(record) = self.records.iter_mut().find(|r| r.sequence == sequence) {
            record.bib = new_bib;
        }
        Ok(previous)
    }

    fn write_entry(&mut self, entry: &JournalEntry) -> RaceResult<()> {
        if self.read_only {
            return Err(anyhow::anyhow!("results journal was opened read-only").into());
        }
        if self.poisoned {
            return Err(anyhow::anyhow!("results journal is not writable; reopen the heat").into());
        }
        let Some(file) = self.journal.as_mut() else {
            return Ok(());
        };
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let len = file
            .metadata()
            .context("Failed to stat results journal")?
            .len();
        if len < self.committed {
            error!(
                committed = self.committed,
                len, "results journal shrank while open; refusing further writes"
            );
            self.poisoned = true;
            return Err(anyhow::anyhow!(
                "results journal shrank from {} to {} bytes while open",
                self.committed,
                len
            )
            .into());
        }
        if len > self.committed {
            warn!(
                bytes = len - self.committed,
                "discarding uncommitted bytes at the end of the journal"
            );
        }

        let written = Self::write_line(file, self.committed, len, &line);
        if let Err(e) = written {
            if let Err(rollback) = Self::truncate_to(file, self.committed) {
                error!(
                    error = %rollback,
                    committed = self.committed,
                    "could not roll back failed journal write; refusing further writes"
                );
                self.poisoned = true;
            }
            return Err(e.into());
        }
        self.committed += line.len() as u64;
        Ok(())
    }

    fn write_line(file: &mut File, committed: u64, len: u64, line: &[u8]) -> anyhow::Result<()> {
        if len > committed {
            Self::truncate_to(file, committed)?;
        }
        file.write_all(line)
            .context("Failed to append to results journal")?;
        file.sync_data()
            .context("Failed to sync results journal")?;
        Ok(())
    }

    fn truncate_to(file: &File, len: u64) -> anyhow::Result<()> {
        file.set_len(len)
            .context("Failed to truncate results journal")?;
        file.sync_data()
            .context("Failed to sync results journal")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_gapless_sequences() {
        let mut store = ResultsStore::in_memory(1);
        for bib in [101, 0, 102] {
            store.append(bib, 1000, FinishSource::Manual).unwrap();
        }
        let sequences: Vec<u64> = store.records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(store.next_sequence(), 4);
        assert_eq!(store.get(2).unwrap().bib, 0);
        assert!(store.get(0).is_none());
        assert!(store.get(4).is_none());
    }

    #[test]
    fn test_correct_unassigned_record() {
        let mut store = ResultsStore::in_memory(1);
        store.append(0, 5000, FinishSource::Manual).unwrap();
        let previous = store.correct(1, 104).unwrap();
        assert_eq!(previous, 0);
        assert_eq!(store.get(1).unwrap().bib, 104);
    }

    #[test]
    fn test_correct_conflict_leaves_records_unchanged() {
        let mut store = ResultsStore::in_memory(1);
        store.append(101, 5000, FinishSource::Manual).unwrap();
        store.append(0, 6000, FinishSource::Manual).unwrap();

        let err = store.correct(2, 101).unwrap_err();
        assert!(matches!(
            err,
            RaceError::CorrectionConflict { bib: 101, existing: 1 }
        ));
        assert_eq!(store.get(1).unwrap().bib, 101);
        assert_eq!(store.get(2).unwrap().bib, 0);
    }

    #[test]
    fn test_correct_missing_sequence() {
        let mut store = ResultsStore::in_memory(1);
        assert!(matches!(store.correct(7, 101), Err(RaceError::NotFound(7))));
    }

    #[test]
    fn test_journal_replay_restores_records_and_corrections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        {
            let mut store = ResultsStore::open(&path, 2).unwrap();
            store.append(101, 960_000, FinishSource::Manual).unwrap();
            store.append(0, 965_000, FinishSource::Manual).unwrap();
            store.append(103, 970_000, FinishSource::Rfid).unwrap();
            store.correct(2, 102).unwrap();
        }

        let store = ResultsStore::open(&path, 2).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(2).unwrap().bib, 102);
        assert_eq!(store.get(3).unwrap().source, FinishSource::Rfid);
        assert_eq!(store.get(3).unwrap().heat, 2);
        assert_eq!(store.next_sequence(), 4);
    }

    #[test]
    fn test_torn_trailing_line_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let mut store = ResultsStore::open(&path, 1).unwrap();
            store.append(101, 1000, FinishSource::Manual).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"kind\":\"finish\",\"seq").unwrap();
        drop(file);

        let mut store = ResultsStore::open(&path, 1).unwrap();
        assert_eq!(store.len(), 1);
        store.append(102, 2000, FinishSource::Manual).unwrap();

        let store = ResultsStore::open(&path, 1).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(2).unwrap().bib, 102);
    }

    #[test]
    fn test_gap_in_journal_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        std::fs::write(
            &path,
            "{\"kind\":\"finish\",\"sequence\":2,\"bib\":1,\"elapsed_ms\":5,\"heat\":1,\"source\":\"manual\"}\n",
        )
        .unwrap();
        assert!(matches!(
            ResultsStore::open(&path, 1),
            Err(RaceError::Storage(_))
        ));
    }

    #[test]
    fn test_uncommitted_tail_discarded_before_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        let mut store = ResultsStore::open(&path, 1).unwrap();
        store.append(101, 1000, FinishSource::Manual).unwrap();

        // what a write that failed part way leaves behind
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"kind\":\"finish\",\"seq").unwrap();
        drop(file);

        let record = store.append(102, 2000, FinishSource::Manual).unwrap();
        assert_eq!(record.sequence, 2);
        drop(store);

        let store = ResultsStore::open(&path, 1).unwrap();
        let bibs: Vec<u32> = store.records().iter().map(|r| r.bib).collect();
        assert_eq!(bibs, vec![101, 102]);
    }

    #[test]
    fn test_uncommitted_full_line_does_not_reuse_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        let mut store = ResultsStore::open(&path, 1).unwrap();
        store.append(101, 1000, FinishSource::Manual).unwrap();

        // a complete line whose sync failed never reached the records
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(
            b"{\"kind\":\"finish\",\"sequence\":2,\"bib\":999,\"elapsed_ms\":1500,\"heat\":1,\"source\":\"manual\"}\n",
        )
        .unwrap();
        drop(file);

        store.append(102, 2000, FinishSource::Manual).unwrap();
        drop(store);

        let store = ResultsStore::open(&path, 1).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(2).unwrap().bib, 102);
    }

    #[test]
    fn test_shrunken_journal_poisons_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        let mut store = ResultsStore::open(&path, 1).unwrap();
        store.append(101, 1000, FinishSource::Manual).unwrap();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(0)
            .unwrap();

        assert!(matches!(
            store.append(102, 2000, FinishSource::Manual),
            Err(RaceError::Storage(_))
        ));
        assert!(store.is_poisoned());
        assert_eq!(store.next_sequence(), 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert!(store.append(103, 3000, FinishSource::Manual).is_err());
    }

    #[test]
    fn test_load_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let mut store = ResultsStore::open(&path, 1).unwrap();
            store.append(101, 1000, FinishSource::Manual).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"kind\":\"fin").unwrap();
        drop(file);
        let len_before = std::fs::metadata(&path).unwrap().len();

        let mut store = ResultsStore::load(&path, 1).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.append(102, 2000, FinishSource::Manual).is_err());
        assert!(store.correct(1, 103).is_err());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);

        let missing = ResultsStore::load(&dir.path().join("none.jsonl"), 1).unwrap();
        assert!(missing.is_empty());
    }
}
