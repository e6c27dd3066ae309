//! On-disk side of the fuzzy content index: the record codec and the
//! append-only log that stores encoded records back to back.

mod error;
mod log;
mod record;

pub use error::{LogError, Result};
pub use log::{AppendLog, LogScan, DEFAULT_LOG_FILE};
pub use record::{decode, encode, encode_into, Record, RecordReader, RecordWriter};
