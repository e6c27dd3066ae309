use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to {op} log {path:?}: {source}")]
    File {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
    #[error("record path is empty")]
    EmptyPath,
    #[error("{field} length {len} does not fit in a u32 prefix")]
    FieldTooLong { field: &'static str, len: usize },
}

pub type Result<T> = std::result::Result<T, LogError>;

impl LogError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, LogError::Corrupt { .. })
    }

    pub(crate) fn file(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::File {
            op,
            path: path.into(),
            source,
        }
    }
}
