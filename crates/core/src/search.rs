//! Single-pass similarity search over the append log.
//!
//! One scan thread walks the log in append order. For every stored record it
//! dispatches one comparison per query fingerprint onto a worker pool; each
//! dispatch first takes a slot from an [`AdmissionGate`] sized to the worker
//! limit, so the scan stalls instead of queueing unbounded work. Matches flow
//! back through a bounded channel and surface as a [`SearchStream`].

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use fuzzdex_index::{AppendLog, LogError, LogScan, Record};
use tracing::{debug, info, warn};

use crate::error::{FuzzError, Result};
use crate::fingerprint::Fingerprint;
use crate::gate::AdmissionGate;
use crate::similarity::{is_similar, ErrorRate};

pub const DEFAULT_SEARCH_WORKERS: usize = 8;
/// Matches buffered before comparison workers block on the consumer.
pub const MATCH_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub error_rate: ErrorRate,
    pub workers: usize,
}

impl SearchOptions {
    pub fn new(error_rate: ErrorRate, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(FuzzError::InvalidWorkerLimit);
        }
        Ok(Self {
            error_rate,
            workers,
        })
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            error_rate: ErrorRate::default(),
            workers: DEFAULT_SEARCH_WORKERS,
        }
    }
}

/// A stored path similar to the query at index `query`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchMatch {
    pub query: usize,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub records_scanned: usize,
    pub comparisons: usize,
    pub matches: usize,
    /// Similar records whose file no longer exists.
    pub missing_skipped: usize,
    /// Most comparisons observed running at the same time.
    pub peak_in_flight: usize,
    pub cancelled: bool,
}

/// Unordered stream of matches from a running search.
///
/// Iterate it to receive matches as they are found, then call
/// [`finish`](SearchStream::finish) to learn whether the scan completed.
/// Dropping the stream cancels the search: no new comparisons are
/// dispatched and those already running are left to finish.
pub struct SearchStream {
    matches: Receiver<SearchMatch>,
    gate: Arc<AdmissionGate>,
    scan: Option<JoinHandle<Result<SearchSummary>>>,
}

impl SearchStream {
    /// Stops dispatching new comparisons. Matches already found can still be
    /// read from the stream.
    pub fn cancel(&self) {
        self.gate.close();
    }

    /// Waits for the scan and every dispatched comparison to end, and
    /// returns the first fatal error if there was one. Matches not yet read
    /// are discarded.
    pub fn finish(mut self) -> Result<SearchSummary> {
        for _ in self.matches.iter() {}
        match self.scan.take() {
            Some(handle) => handle.join().map_err(|_| FuzzError::ScanPanicked)?,
            None => Ok(SearchSummary::default()),
        }
    }

    /// Drains the stream. Matches found before a fatal scan error are
    /// returned alongside it.
    pub fn into_matches(mut self) -> (Vec<SearchMatch>, Result<SearchSummary>) {
        let found: Vec<_> = self.by_ref().collect();
        let outcome = self.finish();
        (found, outcome)
    }
}

impl Iterator for SearchStream {
    type Item = SearchMatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.matches.recv().ok()
    }
}

impl Drop for SearchStream {
    fn drop(&mut self) {
        self.gate.close();
    }
}

/// Starts a search of `log` for records similar to any of `queries`.
///
/// Opening the log happens before this returns, so a log that cannot be
/// opened is reported here; errors found while scanning are reported by
/// [`SearchStream::finish`].
pub fn search(
    log: &AppendLog,
    queries: Vec<Fingerprint>,
    options: &SearchOptions,
) -> Result<SearchStream> {
    if options.workers == 0 {
        return Err(FuzzError::InvalidWorkerLimit);
    }
    let scan = log.scan()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .thread_name(|i| format!("fuzzdex-search-{i}"))
        .build()?;
    let gate = AdmissionGate::new(options.workers);
    let (tx, rx) = crossbeam_channel::bounded(MATCH_CHANNEL_CAPACITY);

    let scan_gate = Arc::clone(&gate);
    let error_rate = options.error_rate.value();
    debug!(
        log = %log.path().display(),
        queries = queries.len(),
        workers = options.workers,
        error_rate,
        "starting search"
    );
    let handle = thread::Builder::new()
        .name("fuzzdex-scan".to_string())
        .spawn(move || {
            let scanner = Scanner {
                queries,
                error_rate,
                pool,
                gate: scan_gate,
            };
            scanner.run(scan, tx)
        })
        .map_err(FuzzError::Spawn)?;

    Ok(SearchStream {
        matches: rx,
        gate,
        scan: Some(handle),
    })
}

struct Scanner {
    queries: Vec<Fingerprint>,
    error_rate: f64,
    pool: rayon::ThreadPool,
    gate: Arc<AdmissionGate>,
}

#[derive(Default)]
struct Counters {
    comparisons: AtomicUsize,
    matches: AtomicUsize,
    missing: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Scanner {
    fn run(self, scan: LogScan, tx: Sender<SearchMatch>) -> Result<SearchSummary> {
        let counters = Counters::default();
        let (records_scanned, fatal, cancelled) = self.pool.in_place_scope(|scope| {
            let mut records_scanned = 0usize;
            let mut fatal: Option<LogError> = None;
            let mut cancelled = false;
            'records: for item in scan {
                let record = match item {
                    Ok(record) => Arc::new(record),
                    Err(err) => {
                        fatal = Some(err);
                        break;
                    }
                };
                records_scanned += 1;
                for (query, fingerprint) in self.queries.iter().enumerate() {
                    let Ok(permit) = self.gate.acquire() else {
                        cancelled = true;
                        break 'records;
                    };
                    let record = Arc::clone(&record);
                    let tx = &tx;
                    let counters = &counters;
                    let error_rate = self.error_rate;
                    scope.spawn(move |_| {
                        let _permit = permit;
                        let now = counters.running.fetch_add(1, Ordering::SeqCst) + 1;
                        counters.peak.fetch_max(now, Ordering::SeqCst);
                        compare(query, fingerprint, &record, error_rate, tx, counters);
                        counters.running.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }
            (records_scanned, fatal, cancelled)
        });
        drop(tx);

        let summary = SearchSummary {
            records_scanned,
            comparisons: counters.comparisons.into_inner(),
            matches: counters.matches.into_inner(),
            missing_skipped: counters.missing.into_inner(),
            peak_in_flight: counters.peak.into_inner(),
            cancelled,
        };
        if cancelled {
            warn!(records = summary.records_scanned, "search cancelled before the end of the log");
        }
        if let Some(err) = fatal {
            warn!(
                records = summary.records_scanned,
                matches = summary.matches,
                "search stopped on unreadable log: {err}"
            );
            return Err(err.into());
        }
        info!(
            records = summary.records_scanned,
            comparisons = summary.comparisons,
            matches = summary.matches,
            missing = summary.missing_skipped,
            peak_in_flight = summary.peak_in_flight,
            "search finished"
        );
        Ok(summary)
    }
}

fn compare(
    query: usize,
    fingerprint: &Fingerprint,
    record: &Record,
    error_rate: f64,
    tx: &Sender<SearchMatch>,
    counters: &Counters,
) {
    counters.comparisons.fetch_add(1, Ordering::Relaxed);
    if !is_similar(fingerprint.as_bytes(), &record.fingerprint, error_rate) {
        return;
    }
    if fs::metadata(&record.path).is_err() {
        counters.missing.fetch_add(1, Ordering::Relaxed);
        debug!(path = %record.path, "similar record no longer exists on disk, skipping");
        return;
    }
    let found = SearchMatch {
        query,
        path: record.path.clone(),
    };
    if tx.send(found).is_ok() {
        counters.matches.fetch_add(1, Ordering::Relaxed);
    }
}
