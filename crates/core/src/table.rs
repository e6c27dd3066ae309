use std::collections::HashMap;
use std::path::Path;

use fuzzdex_index::AppendLog;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{FuzzError, Result};
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::indexer::record_path;
use crate::similarity::is_similar;

/// In-memory map from stored path to fingerprint.
///
/// Lookups share a read lock and may run concurrently; inserts take the
/// write lock and exclude everything else.
#[derive(Debug, Default)]
pub struct SignatureTable {
    entries: RwLock<HashMap<String, Fingerprint>>,
}

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the latest fingerprint of every path in the log. A record
    /// replaces any earlier record for the same path.
    pub fn from_log(log: &AppendLog) -> Result<Self> {
        let mut entries = HashMap::new();
        for record in log.scan()? {
            let record = record?;
            entries.insert(record.path, Fingerprint::from(record.fingerprint));
        }
        debug!(paths = entries.len(), log = %log.path().display(), "loaded signature table");
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    pub fn insert(&self, path: impl Into<String>, fingerprint: Fingerprint) -> Option<Fingerprint> {
        self.entries.write().insert(path.into(), fingerprint)
    }

    pub fn index_file(&self, path: &Path, fingerprinter: &Fingerprinter) -> Result<Fingerprint> {
        let key = record_path(path)?;
        let fingerprint = fingerprinter.fingerprint(path)?;
        self.insert(key, fingerprint.clone());
        Ok(fingerprint)
    }

    pub fn get(&self, path: &str) -> Option<Fingerprint> {
        self.entries.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Every other stored path whose fingerprint is within `error_rate` of the
    /// fingerprint stored for `path`, sorted.
    pub fn find_similar(&self, path: &str, error_rate: f64) -> Result<Vec<String>> {
        let entries = self.entries.read();
        let target = entries
            .get(path)
            .ok_or_else(|| FuzzError::NotIndexed(path.to_string()))?;
        let mut similar: Vec<String> = entries
            .iter()
            .filter(|(other, _)| other.as_str() != path)
            .filter(|(_, fingerprint)| is_similar(target.as_bytes(), fingerprint.as_bytes(), error_rate))
            .map(|(other, _)| other.clone())
            .collect();
        drop(entries);
        similar.sort();
        Ok(similar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzdex_index::Record;
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn with_flipped_bits(base: &[u8], bits: usize) -> Fingerprint {
        let mut bytes = base.to_vec();
        for bit in 0..bits {
            bytes[bit / 8] ^= 1 << (bit % 8);
        }
        Fingerprint::from(bytes)
    }

    #[test]
    fn find_similar_excludes_the_target_and_respects_the_rate() {
        let table = SignatureTable::new();
        let base = vec![0u8; 32];
        table.insert("target", Fingerprint::from(base.clone()));
        table.insert("close", with_flipped_bits(&base, 20));
        table.insert("far", with_flipped_bits(&base, 100));
        table.insert("other-scheme", Fingerprint::from(vec![0u8; 64]));

        assert_eq!(table.find_similar("target", 0.1).unwrap(), vec!["close"]);
        assert_eq!(
            table.find_similar("target", 0.5).unwrap(),
            vec!["close", "far"]
        );
        assert!(matches!(
            table.find_similar("unknown", 0.1),
            Err(FuzzError::NotIndexed(_))
        ));
    }

    #[test]
    fn later_log_records_win() {
        let dir = tempdir().unwrap();
        let log = AppendLog::new(dir.path().join("file_index"));
        log.append(&Record::new("a", vec![1u8; 32])).unwrap();
        log.append(&Record::new("b", vec![2u8; 32])).unwrap();
        log.append(&Record::new("a", vec![3u8; 32])).unwrap();

        let table = SignatureTable::from_log(&log).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a").unwrap().as_bytes(), &[3u8; 32]);
    }

    #[test]
    fn index_file_uses_the_cleaned_path_as_key() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, b"content").unwrap();
        let table = SignatureTable::new();
        let fp = table.index_file(&file, &Fingerprinter::default()).unwrap();
        assert_eq!(table.get(file.to_str().unwrap()), Some(fp));
        assert!(!table.is_empty());
    }

    #[test]
    fn readers_and_writers_interleave_safely() {
        let table = Arc::new(SignatureTable::new());
        table.insert("seed", Fingerprint::from(vec![0u8; 32]));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for i in 0..50 {
                        table.insert(format!("w{w}-{i}"), Fingerprint::from(vec![0u8; 32]));
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for _ in 0..50 {
                        table.find_similar("seed", 0.0).unwrap();
                    }
                })
            })
            .collect();
        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }
        assert_eq!(table.find_similar("seed", 0.0).unwrap().len(), 200);
    }
}
