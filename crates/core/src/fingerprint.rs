use std::fmt;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use serde::Deserialize;

use crate::error::{FuzzError, Result};

pub const HASH_SIZE: usize = 32;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_SAMPLE_RATE: f64 = 0.1;
/// Sampled mode samples every file unless a size floor is configured.
pub const DEFAULT_MIN_SAMPLED_SIZE: u64 = 0;

/// Content summary of one file: a single BLAKE3 digest, or one digest per
/// sampled chunk laid end to end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of 32-byte digests in the fingerprint.
    pub fn blocks(&self) -> usize {
        self.0.len() / HASH_SIZE
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<Vec<u8>> for Fingerprint {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash.as_bytes().to_vec())
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    #[default]
    Whole,
    Sampled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintConfig {
    pub mode: FingerprintMode,
    pub chunk_size: usize,
    pub sample_rate: f64,
    /// Files smaller than this stay on the whole-file path in sampled mode.
    /// Zero disables the floor.
    pub min_sampled_size: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            mode: FingerprintMode::Whole,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            min_sampled_size: DEFAULT_MIN_SAMPLED_SIZE,
        }
    }
}

impl FingerprintConfig {
    pub fn sampled() -> Self {
        Self {
            mode: FingerprintMode::Sampled,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    config: FingerprintConfig,
}

impl Fingerprinter {
    pub fn new(config: FingerprintConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(FuzzError::InvalidConfig("chunk size must be positive"));
        }
        if !(config.sample_rate > 0.0 && config.sample_rate <= 1.0) {
            return Err(FuzzError::InvalidConfig("sample rate must be in (0, 1]"));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Fingerprints the file at `path`. Either the complete fingerprint is
    /// returned or an error; nothing partial.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let mut file = File::open(path).map_err(|err| FuzzError::io("open", path, err))?;
        if self.config.mode == FingerprintMode::Whole {
            return whole_file(&mut file, path);
        }
        let size = file
            .metadata()
            .map_err(|err| FuzzError::io("stat", path, err))?
            .len();
        if size < self.config.min_sampled_size {
            return whole_file(&mut file, path);
        }
        match self.sampled_chunks(&mut file, size, path)? {
            Some(signature) => Ok(signature),
            None => whole_file(&mut file, path),
        }
    }

    /// Hashes `floor(N * sample_rate)` chunks at a uniform stride, where `N` is
    /// the chunk count. Returns `None` when that rounds down to zero chunks.
    fn sampled_chunks(&self, file: &mut File, size: u64, path: &Path) -> Result<Option<Fingerprint>> {
        let chunk_size = self.config.chunk_size as u64;
        let chunks = size.div_ceil(chunk_size);
        let sampled = (chunks as f64 * self.config.sample_rate).floor() as u64;
        if sampled == 0 {
            return Ok(None);
        }
        let stride = chunks / sampled;

        let mut signature = Vec::with_capacity(sampled as usize * HASH_SIZE);
        let mut buffer = vec![0u8; self.config.chunk_size];
        for i in 0..sampled {
            let offset = i * stride * chunk_size;
            file.seek(SeekFrom::Start(offset))
                .map_err(|err| FuzzError::io("seek", path, err))?;
            let n = read_chunk(file, &mut buffer).map_err(|err| FuzzError::io("read", path, err))?;
            signature.extend_from_slice(blake3::hash(&buffer[..n]).as_bytes());
        }
        Ok(Some(Fingerprint(signature)))
    }
}

fn whole_file(file: &mut File, path: &Path) -> Result<Fingerprint> {
    file.seek(SeekFrom::Start(0))
        .map_err(|err| FuzzError::io("seek", path, err))?;
    let mut hasher = blake3::Hasher::new();
    io::copy(file, &mut hasher).map_err(|err| FuzzError::io("hash", path, err))?;
    Ok(hasher.finalize().into())
}

fn read_chunk(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sampled_everywhere(sample_rate: f64) -> Fingerprinter {
        Fingerprinter::new(FingerprintConfig {
            mode: FingerprintMode::Sampled,
            sample_rate,
            min_sampled_size: 0,
            ..FingerprintConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn whole_file_is_blake3_of_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello world").unwrap();

        let fp = Fingerprinter::default().fingerprint(&path).unwrap();
        assert_eq!(fp.len(), HASH_SIZE);
        assert_eq!(fp.as_bytes(), blake3::hash(b"hello world").as_bytes());
        assert_eq!(fp.to_hex(), blake3::hash(b"hello world").to_hex().as_str());
    }

    #[test]
    fn empty_file_still_has_a_fingerprint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        let fp = sampled_everywhere(0.1).fingerprint(&path).unwrap();
        assert_eq!(fp.len(), HASH_SIZE);
    }

    #[test]
    fn file_smaller_than_a_chunk_falls_back_to_whole_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny");
        fs::write(&path, b"tiny").unwrap();

        let fp = sampled_everywhere(0.1).fingerprint(&path).unwrap();
        assert_eq!(fp.as_bytes(), blake3::hash(b"tiny").as_bytes());
    }

    #[test]
    fn sampled_signature_has_one_digest_per_sampled_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        // 25 chunks -> floor(25 * 0.1) = 2 sampled, stride 12.
        let data: Vec<u8> = (0..25 * DEFAULT_CHUNK_SIZE).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let fp = sampled_everywhere(0.1).fingerprint(&path).unwrap();
        assert_eq!(fp.len(), 2 * HASH_SIZE);
        assert_eq!(fp.blocks(), 2);

        let first = blake3::hash(&data[..DEFAULT_CHUNK_SIZE]);
        let second_start = 12 * DEFAULT_CHUNK_SIZE;
        let second = blake3::hash(&data[second_start..second_start + DEFAULT_CHUNK_SIZE]);
        assert_eq!(&fp.as_bytes()[..HASH_SIZE], first.as_bytes());
        assert_eq!(&fp.as_bytes()[HASH_SIZE..], second.as_bytes());
    }

    #[test]
    fn sampled_mode_hashes_a_short_final_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragged.bin");
        // 3 chunks, the last one only 10 bytes; rate 1.0 samples all three.
        let data = vec![7u8; 2 * DEFAULT_CHUNK_SIZE + 10];
        fs::write(&path, &data).unwrap();

        let fp = sampled_everywhere(1.0).fingerprint(&path).unwrap();
        assert_eq!(fp.blocks(), 3);
        let tail = blake3::hash(&data[2 * DEFAULT_CHUNK_SIZE..]);
        assert_eq!(&fp.as_bytes()[2 * HASH_SIZE..], tail.as_bytes());
    }

    #[test]
    fn default_sampled_config_samples_files_of_any_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medium.bin");
        // 40 chunks -> floor(40 * 0.1) = 4 sampled, stride 10.
        let data: Vec<u8> = (0..40 * DEFAULT_CHUNK_SIZE).map(|i| (i % 253) as u8).collect();
        fs::write(&path, &data).unwrap();

        let fp = Fingerprinter::new(FingerprintConfig::sampled())
            .unwrap()
            .fingerprint(&path)
            .unwrap();
        assert_eq!(fp.len(), 4 * HASH_SIZE);
        let fourth_start = 30 * DEFAULT_CHUNK_SIZE;
        let fourth = blake3::hash(&data[fourth_start..fourth_start + DEFAULT_CHUNK_SIZE]);
        assert_eq!(&fp.as_bytes()[3 * HASH_SIZE..], fourth.as_bytes());
    }

    #[test]
    fn small_files_stay_whole_below_a_configured_floor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medium.bin");
        let data = vec![1u8; 40 * DEFAULT_CHUNK_SIZE];
        fs::write(&path, &data).unwrap();

        let fp = Fingerprinter::new(FingerprintConfig {
            min_sampled_size: 1024 * 1024,
            ..FingerprintConfig::sampled()
        })
        .unwrap()
        .fingerprint(&path)
        .unwrap();
        assert_eq!(fp.as_bytes(), blake3::hash(&data).as_bytes());
    }

    #[test]
    fn same_content_same_fingerprint() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"identical bytes").unwrap();
        fs::write(&b, b"identical bytes").unwrap();
        let fingerprinter = Fingerprinter::default();
        assert_eq!(
            fingerprinter.fingerprint(&a).unwrap(),
            fingerprinter.fingerprint(&b).unwrap()
        );
    }

    #[test]
    fn missing_file_reports_operation_and_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope");
        let err = Fingerprinter::default().fingerprint(&path).unwrap_err();
        match &err {
            FuzzError::Io { op, path: p, .. } => {
                assert_eq!(*op, "open");
                assert_eq!(p, &path);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let zero_chunk = FingerprintConfig {
            chunk_size: 0,
            ..FingerprintConfig::default()
        };
        assert!(Fingerprinter::new(zero_chunk).is_err());
        let bad_rate = FingerprintConfig {
            sample_rate: 1.5,
            ..FingerprintConfig::default()
        };
        assert!(Fingerprinter::new(bad_rate).is_err());
    }
}
