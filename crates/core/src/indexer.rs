use std::path::{Component, Path, PathBuf};

use fuzzdex_index::{AppendLog, Record};
use rayon::prelude::*;
use tracing::{error, info};

use crate::error::{FuzzError, Result};
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::store::ContentStore;

pub const DEFAULT_INDEX_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub fingerprint: Fingerprint,
    /// Where the content store put its copy, when one is configured.
    pub blob: Option<PathBuf>,
}

#[derive(Debug)]
pub struct IndexOutcome {
    pub path: PathBuf,
    pub result: Result<IndexedFile>,
}

impl IndexOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Normalizes `path` the way it is stored in the log: redundant separators
/// and `.` components removed, UTF-8 required.
pub fn record_path(path: &Path) -> Result<String> {
    if path.as_os_str().is_empty() {
        return Err(FuzzError::EmptyPath);
    }
    let cleaned: PathBuf = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();
    if cleaned.as_os_str().is_empty() {
        return Err(FuzzError::EmptyPath);
    }
    cleaned
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| FuzzError::NonUtf8Path(path.to_path_buf()))
}

pub struct Indexer<'a> {
    log: &'a AppendLog,
    fingerprinter: &'a Fingerprinter,
    store: Option<&'a ContentStore>,
}

impl<'a> Indexer<'a> {
    pub fn new(log: &'a AppendLog, fingerprinter: &'a Fingerprinter) -> Self {
        Self {
            log,
            fingerprinter,
            store: None,
        }
    }

    pub fn with_store(mut self, store: &'a ContentStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Fingerprints one file, copies it into the content store if there is
    /// one, and appends its record.
    pub fn index_file(&self, path: &Path) -> Result<IndexedFile> {
        let stored_path = record_path(path)?;
        let fingerprint = self.fingerprinter.fingerprint(path)?;
        let blob = match self.store {
            Some(store) => Some(store.store(path, &fingerprint)?),
            None => None,
        };
        self.log
            .append(&Record::new(stored_path, fingerprint.as_bytes()))?;
        Ok(IndexedFile { fingerprint, blob })
    }

    /// Indexes every path on a pool of `workers` threads. A failing file is
    /// logged and reported in its outcome; the rest of the batch carries on.
    /// Outcomes come back in input order.
    pub fn index_files(&self, paths: &[PathBuf], workers: usize) -> Result<Vec<IndexOutcome>> {
        if workers == 0 {
            return Err(FuzzError::InvalidWorkerLimit);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fuzzdex-index-{i}"))
            .build()?;
        let outcomes: Vec<IndexOutcome> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let result = self.index_file(path);
                    if let Err(err) = &result {
                        error!(path = %path.display(), "failed to index file: {err}");
                    }
                    IndexOutcome {
                        path: path.clone(),
                        result,
                    }
                })
                .collect()
        });
        let indexed = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(
            indexed,
            failed = outcomes.len() - indexed,
            log = %self.log.path().display(),
            "index batch finished"
        );
        Ok(outcomes)
    }
}
