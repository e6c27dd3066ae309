use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Deserialize;
use tracing::debug;

use crate::error::{FuzzError, Result};
use crate::fingerprint::Fingerprint;

pub const DEFAULT_CONTENT_ROOT: &str = "indexed_files";
/// Bytes moved per read/write step when copying into the store.
pub const COPY_BATCH_SIZE: usize = 1024;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Gzip,
    Zstd,
}

/// Content-addressed copies of indexed files, one blob per fingerprint at
/// `<root>/<hex(fingerprint)>`.
///
/// Storing a fingerprint that already has a blob rewrites it. A failed store
/// may leave a partial blob behind; it is not cleaned up.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    compression: Compression,
}

impl ContentStore {
    pub fn new<P: AsRef<Path>>(root: P, compression: Compression) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            compression,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn location(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.to_hex())
    }

    pub fn store(&self, source: &Path, fingerprint: &Fingerprint) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .map_err(|err| FuzzError::io("create directory", &self.root, err))?;
        let mut input = File::open(source).map_err(|err| FuzzError::io("open", source, err))?;
        let dest = self.location(fingerprint);
        let output = File::create(&dest).map_err(|err| FuzzError::io("create", &dest, err))?;

        let copied = match self.compression {
            Compression::None => {
                let mut writer = BufWriter::new(output);
                let copied = copy_batches(&mut input, &mut writer, source, &dest)?;
                writer
                    .flush()
                    .map_err(|err| FuzzError::io("flush", &dest, err))?;
                copied
            }
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(output, flate2::Compression::default());
                let copied = copy_batches(&mut input, &mut encoder, source, &dest)?;
                encoder
                    .finish()
                    .map_err(|err| FuzzError::io("finish gzip stream for", &dest, err))?;
                copied
            }
            Compression::Zstd => {
                let mut encoder = zstd::stream::Encoder::new(output, ZSTD_LEVEL)
                    .map_err(|err| FuzzError::io("start zstd stream for", &dest, err))?;
                let copied = copy_batches(&mut input, &mut encoder, source, &dest)?;
                encoder
                    .finish()
                    .map_err(|err| FuzzError::io("finish zstd stream for", &dest, err))?;
                copied
            }
        };
        debug!(
            source = %source.display(),
            blob = %dest.display(),
            bytes = copied,
            compression = ?self.compression,
            "stored content blob"
        );
        Ok(dest)
    }

    /// Reads a blob back, undoing the store's compression.
    pub fn load(&self, fingerprint: &Fingerprint) -> Result<Vec<u8>> {
        let path = self.location(fingerprint);
        let file = File::open(&path).map_err(|err| FuzzError::io("open", &path, err))?;
        let mut reader: Box<dyn Read> = match self.compression {
            Compression::None => Box::new(BufReader::new(file)),
            Compression::Gzip => Box::new(GzDecoder::new(file)),
            Compression::Zstd => Box::new(
                zstd::stream::Decoder::new(file)
                    .map_err(|err| FuzzError::io("start zstd stream for", &path, err))?,
            ),
        };
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|err| FuzzError::io("read", &path, err))?;
        Ok(buf)
    }
}

fn copy_batches<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    source: &Path,
    dest: &Path,
) -> Result<u64> {
    let mut buffer = [0u8; COPY_BATCH_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FuzzError::io("read", source, err)),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|err| FuzzError::io("write", dest, err))?;
        total += n as u64;
    }
    Ok(total)
}
