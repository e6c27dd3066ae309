use std::path::PathBuf;

use fuzzdex_index::LogError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FuzzError {
    #[error("failed to {op} {path:?}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("file path is empty")]
    EmptyPath,
    #[error("path {0:?} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
    #[error("error rate {0} is outside [0, 1]")]
    InvalidErrorRate(f64),
    #[error("error rate {0:?} is not a number or a percentage")]
    UnparsableErrorRate(String),
    #[error("worker limit must be at least 1")]
    InvalidWorkerLimit,
    #[error("invalid fingerprint config: {0}")]
    InvalidConfig(&'static str),
    #[error("{0} is not in the signature table")]
    NotIndexed(String),
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to spawn scan thread: {0}")]
    Spawn(std::io::Error),
    #[error("scan thread panicked")]
    ScanPanicked,
}

pub type Result<T> = std::result::Result<T, FuzzError>;

impl FuzzError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FuzzError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// True when the append log could not be parsed past some record.
    pub fn is_corruption(&self) -> bool {
        matches!(self, FuzzError::Log(err) if err.is_corruption())
    }
}
