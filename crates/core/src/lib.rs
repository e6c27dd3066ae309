//! Near-duplicate file detection on top of the fuzzdex append log.
//!
//! Files are reduced to BLAKE3 fingerprints, recorded in an append-only
//! log, and found again by Hamming distance between fingerprints.

mod error;
mod fingerprint;
mod gate;
mod indexer;
mod search;
mod similarity;
mod store;
mod table;

pub use error::{FuzzError, Result};
pub use fingerprint::{
    Fingerprint, FingerprintConfig, FingerprintMode, Fingerprinter, DEFAULT_CHUNK_SIZE,
    DEFAULT_MIN_SAMPLED_SIZE, DEFAULT_SAMPLE_RATE, HASH_SIZE,
};
pub use fuzzdex_index::{AppendLog, LogError, Record, DEFAULT_LOG_FILE};
pub use gate::{AdmissionGate, GateClosed, Permit};
pub use indexer::{record_path, IndexOutcome, IndexedFile, Indexer, DEFAULT_INDEX_WORKERS};
pub use search::{
    search, SearchMatch, SearchOptions, SearchStream, SearchSummary, DEFAULT_SEARCH_WORKERS,
    MATCH_CHANNEL_CAPACITY,
};
pub use similarity::{hamming_distance, is_similar, similarity_gap, ErrorRate, DEFAULT_ERROR_RATE};
pub use store::{Compression, ContentStore, COPY_BATCH_SIZE, DEFAULT_CONTENT_ROOT};
pub use table::SignatureTable;
