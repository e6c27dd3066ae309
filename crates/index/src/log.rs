use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{LogError, Result};
use crate::record::{Record, RecordReader, RecordWriter};

pub const DEFAULT_LOG_FILE: &str = "file_index";

/// Flat append-only file of encoded records.
///
/// Appends open the file, write whole records and close it again before
/// returning. Within one process appends are serialized, so records written
/// from different worker threads never interleave. There is no index: every
/// lookup is a full forward [`scan`](AppendLog::scan).
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl AppendLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &Record) -> Result<()> {
        self.append_all(std::slice::from_ref(record))
    }

    /// A failure part way through a record leaves the log unreadable from
    /// that record onwards; nothing is rolled back.
    pub fn append_all(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut encoded = RecordWriter::new(Vec::with_capacity(
            records.iter().map(Record::encoded_len).sum::<usize>(),
        ));
        for record in records {
            encoded.write_record(record)?;
        }
        let bytes = encoded.into_inner();

        let _guard = self.append_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| LogError::file("open", &self.path, err))?;
        file.write_all(&bytes)
            .map_err(|err| LogError::file("write", &self.path, err))?;
        debug!(log = %self.path.display(), records = records.len(), "appended records");
        Ok(())
    }

    /// Opens the log for one forward pass. A log that was never written scans
    /// as empty.
    pub fn scan(&self) -> Result<LogScan> {
        let reader = match File::open(&self.path) {
            Ok(file) => Some(RecordReader::new(BufReader::new(file))),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(log = %self.path.display(), "log does not exist yet, nothing to scan");
                None
            }
            Err(err) => return Err(LogError::file("open", &self.path, err)),
        };
        Ok(LogScan {
            path: self.path.clone(),
            reader,
        })
    }

    /// Reads every record into memory.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        self.scan()?.collect()
    }
}

/// Single forward pass over the log. Yields every record in append order,
/// then either stops or yields exactly one error and stops. The file handle
/// is released as soon as the pass ends.
pub struct LogScan {
    path: PathBuf,
    reader: Option<RecordReader<BufReader<File>>>,
}

impl LogScan {
    /// Byte offset of the next record, if the pass is still open.
    pub fn offset(&self) -> Option<u64> {
        self.reader.as_ref().map(RecordReader::offset)
    }
}

impl Iterator for LogScan {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        match reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.reader = None;
                None
            }
            Err(err) => {
                self.reader = None;
                Some(Err(match err {
                    LogError::Io(source) => LogError::file("read", &self.path, source),
                    other => other,
                }))
            }
        }
    }
}

impl std::iter::FusedIterator for LogScan {}
