//! Readers for the label-scan index and secondary indexes.
//!
//! Both are exposed as lazy, single-use entry sequences. The on-disk form is
//! newline-delimited JSON, one entry per line, parsed as the sequence is
//! consumed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::schema::SchemaRule;
use super::{Result, StoreError};

/// One label-scan entry: a node and the labels the index holds for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLabelEntry {
    /// Node id.
    pub node: u64,
    /// Label token ids.
    pub labels: Vec<u32>,
}

/// Value stored in a secondary index entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// String value.
    String(String),
}

/// One secondary index entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Indexed node.
    pub node: u64,
    /// Indexed value.
    pub value: IndexValue,
}

/// Lazy entry sequence; an `Err` item ends the sequence as a read failure.
pub type EntryIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + Send + 'a>;

/// Reader for the label-scan index.
pub trait LabelScanStore: Send + Sync {
    /// Opens a fresh pass over all entries, in ascending node order.
    fn entries(&self) -> Result<EntryIter<'_, NodeLabelEntry>>;
}

/// Readers for the secondary index of each index rule.
pub trait IndexAccessors: Send + Sync {
    /// Opens a fresh pass over the entries of `rule`.
    fn entries(&self, rule: &SchemaRule) -> Result<EntryIter<'_, IndexEntry>>;
}

struct JsonLines<T> {
    source_name: String,
    lines: std::io::Lines<BufReader<File>>,
    line_no: usize,
    failed: bool,
    _entry: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JsonLines<T> {
    fn open(path: &Path) -> Result<Self> {
        let source_name = path.display().to_string();
        let file = File::open(path).map_err(|err| StoreError::Entry {
            source_name: source_name.clone(),
            message: err.to_string(),
        })?;
        Ok(Self {
            source_name,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            failed: false,
            _entry: PhantomData,
        })
    }

    fn fail(&mut self, message: String) -> Option<Result<T>> {
        self.failed = true;
        Some(Err(StoreError::Entry {
            source_name: self.source_name.clone(),
            message,
        }))
    }
}

impl<T: DeserializeOwned> Iterator for JsonLines<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return self.fail(err.to_string()),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return match serde_json::from_str(&line) {
                Ok(entry) => Some(Ok(entry)),
                Err(err) => {
                    let message = format!("line {}: {err}", self.line_no);
                    self.fail(message)
                }
            };
        }
    }
}

/// Label-scan index stored as a JSON-lines file.
#[derive(Clone, Debug)]
pub struct JsonLinesLabelScan {
    path: PathBuf,
}

impl JsonLinesLabelScan {
    /// Reader over the file at `path`; the file is opened per pass.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LabelScanStore for JsonLinesLabelScan {
    fn entries(&self) -> Result<EntryIter<'_, NodeLabelEntry>> {
        Ok(Box::new(JsonLines::<NodeLabelEntry>::open(&self.path)?))
    }
}

/// Secondary indexes stored as one JSON-lines file per rule id.
#[derive(Clone, Debug)]
pub struct JsonLinesIndexes {
    dir: PathBuf,
}

impl JsonLinesIndexes {
    /// Readers over the files of `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding the entries of `rule_id`.
    pub fn entry_file(dir: &Path, rule_id: u64) -> PathBuf {
        dir.join(format!("{rule_id}.jsonl"))
    }
}

impl IndexAccessors for JsonLinesIndexes {
    fn entries(&self, rule: &SchemaRule) -> Result<EntryIter<'_, IndexEntry>> {
        let path = Self::entry_file(&self.dir, rule.id);
        Ok(Box::new(JsonLines::<IndexEntry>::open(&path)?))
    }
}

/// In-memory label-scan index.
#[derive(Clone, Debug, Default)]
pub struct MemoryLabelScan {
    entries: Vec<NodeLabelEntry>,
}

impl MemoryLabelScan {
    /// Index holding `entries`, sorted by node id.
    pub fn new(mut entries: Vec<NodeLabelEntry>) -> Self {
        entries.sort_by_key(|entry| entry.node);
        Self { entries }
    }

    /// Entries held by the index.
    pub fn as_slice(&self) -> &[NodeLabelEntry] {
        &self.entries
    }
}

impl LabelScanStore for MemoryLabelScan {
    fn entries(&self) -> Result<EntryIter<'_, NodeLabelEntry>> {
        Ok(Box::new(self.entries.iter().cloned().map(Ok)))
    }
}

/// In-memory secondary indexes keyed by rule id.
#[derive(Clone, Debug, Default)]
pub struct MemoryIndexes {
    entries: FxHashMap<u64, Vec<IndexEntry>>,
    failing: FxHashSet<u64>,
}

impl MemoryIndexes {
    /// Empty set of indexes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entries of `rule_id`.
    pub fn insert(&mut self, rule_id: u64, mut entries: Vec<IndexEntry>) {
        entries.sort_by_key(|entry| entry.node);
        self.entries.insert(rule_id, entries);
    }

    /// Entries held for `rule_id`.
    pub fn get(&self, rule_id: u64) -> Option<&[IndexEntry]> {
        self.entries.get(&rule_id).map(Vec::as_slice)
    }

    /// Makes the entry sequence of `rule_id` fail after its first entry.
    pub fn fail_reads(&mut self, rule_id: u64) {
        self.failing.insert(rule_id);
    }
}

impl IndexAccessors for MemoryIndexes {
    fn entries(&self, rule: &SchemaRule) -> Result<EntryIter<'_, IndexEntry>> {
        let source_name = format!("index {}", rule.id);
        let entries = self
            .entries
            .get(&rule.id)
            .ok_or_else(|| StoreError::Entry {
                source_name: source_name.clone(),
                message: "no entries registered".into(),
            })?;
        if self.failing.contains(&rule.id) {
            let failure = StoreError::Entry {
                source_name,
                message: "simulated read failure".into(),
            };
            let head = entries.iter().take(1).cloned().map(Ok);
            return Ok(Box::new(head.chain(std::iter::once(Err(failure)))));
        }
        Ok(Box::new(entries.iter().cloned().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn index_values_use_tagged_json() -> std::result::Result<(), serde_json::Error> {
        let entry: IndexEntry = serde_json::from_str(r#"{"node":4,"value":{"int":7}}"#)?;
        assert_eq!(
            entry,
            IndexEntry {
                node: 4,
                value: IndexValue::Int(7)
            }
        );
        let text = serde_json::to_string(&IndexValue::String("x".into()))?;
        assert_eq!(text, r#"{"string":"x"}"#);
        Ok(())
    }

    #[test]
    fn json_lines_stop_at_first_bad_line() -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        writeln!(tmp, r#"{{"node":0,"labels":[1]}}"#)?;
        writeln!(tmp)?;
        writeln!(tmp, "not json")?;
        writeln!(tmp, r#"{{"node":2,"labels":[]}}"#)?;
        tmp.flush()?;
        let scan = JsonLinesLabelScan::new(tmp.path());
        let items: Vec<_> = scan.entries()?.collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(&items[1], Err(StoreError::Entry { message, .. }) if message.starts_with("line 3")));
        Ok(())
    }

    #[test]
    fn missing_index_file_is_an_entry_failure() {
        let dir = tempfile::tempdir().unwrap();
        let indexes = JsonLinesIndexes::new(dir.path());
        let rule = SchemaRule::index(3, 0, 0);
        assert!(matches!(indexes.entries(&rule), Err(StoreError::Entry { .. })));
    }

    #[test]
    fn memory_failure_surfaces_after_first_entry() -> Result<()> {
        let mut indexes = MemoryIndexes::new();
        let entry = |node| IndexEntry {
            node,
            value: IndexValue::Bool(true),
        };
        indexes.insert(1, vec![entry(5), entry(2)]);
        indexes.fail_reads(1);
        let items: Vec<_> = indexes.entries(&SchemaRule::index(1, 0, 0))?.collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().map(|e| e.node).ok(), Some(2));
        assert!(items[1].is_err());
        Ok(())
    }
}
