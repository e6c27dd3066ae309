//! Length-prefixed binary layout for one (path, fingerprint) pair.
//!
//! Every record is laid out as
//! `u32 LE path length | path bytes | u32 LE fingerprint length | fingerprint bytes`
//! with no header, checksum or record count. The explicit fingerprint length
//! keeps the layout independent of the hash width, so whole-file and sampled
//! signatures share one log.

use std::io::{self, ErrorKind, Read, Write};

use crate::error::{LogError, Result};

const LEN_PREFIX: usize = 4;
// Upper bound on the buffer reserved up front for a payload; larger declared
// lengths grow as bytes actually arrive.
const PREALLOC_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    pub path: String,
    pub fingerprint: Vec<u8>,
}

impl Record {
    pub fn new(path: impl Into<String>, fingerprint: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Number of bytes this record occupies once encoded.
    pub fn encoded_len(&self) -> usize {
        LEN_PREFIX + self.path.len() + LEN_PREFIX + self.fingerprint.len()
    }
}

pub fn encode(record: &Record) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(record.encoded_len());
    encode_into(record, &mut buf)?;
    Ok(buf)
}

pub fn encode_into(record: &Record, buf: &mut Vec<u8>) -> Result<()> {
    if record.path.is_empty() {
        return Err(LogError::EmptyPath);
    }
    let path_len = prefix("path", record.path.len())?;
    let fingerprint_len = prefix("fingerprint", record.fingerprint.len())?;
    buf.reserve(record.encoded_len());
    buf.extend_from_slice(&path_len.to_le_bytes());
    buf.extend_from_slice(record.path.as_bytes());
    buf.extend_from_slice(&fingerprint_len.to_le_bytes());
    buf.extend_from_slice(&record.fingerprint);
    Ok(())
}

/// Decodes one record from `reader`. `Ok(None)` means the stream ended
/// cleanly on a record boundary.
pub fn decode<R: Read>(reader: &mut R) -> Result<Option<Record>> {
    RecordReader::new(reader).next_record()
}

fn prefix(field: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| LogError::FieldTooLong { field, len })
}

pub struct RecordWriter<W> {
    writer: W,
    buf: Vec<u8>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: Vec::new(),
        }
    }

    /// Writes the whole record with a single `write_all`, so a record is
    /// either handed to the writer in full or not at all.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.buf.clear();
        encode_into(record, &mut self.buf)?;
        self.writer.write_all(&self.buf)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Sequential decoder that tracks the byte offset of every record so
/// corruption can be reported precisely.
pub struct RecordReader<R> {
    reader: R,
    offset: u64,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Byte offset of the next record to be decoded.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let start = self.offset;
        let corrupt = |reason: String| LogError::Corrupt {
            offset: start,
            reason,
        };

        let mut len_buf = [0u8; LEN_PREFIX];
        let read = fill(&mut self.reader, &mut len_buf)?;
        if read == 0 {
            return Ok(None);
        }
        if read < LEN_PREFIX {
            return Err(corrupt(format!(
                "truncated path length prefix ({read} of {LEN_PREFIX} bytes)"
            )));
        }
        let path_len = u32::from_le_bytes(len_buf) as usize;
        if path_len == 0 {
            return Err(corrupt("zero path length".to_string()));
        }
        let path_bytes = self.read_payload(path_len)?.map_err(|got| {
            corrupt(format!(
                "declared path length {path_len} exceeds remaining {got} bytes"
            ))
        })?;
        let path = String::from_utf8(path_bytes)
            .map_err(|err| corrupt(format!("path is not valid UTF-8: {err}")))?;

        let read = fill(&mut self.reader, &mut len_buf)?;
        if read < LEN_PREFIX {
            return Err(corrupt(format!(
                "truncated fingerprint length prefix ({read} of {LEN_PREFIX} bytes)"
            )));
        }
        let fingerprint_len = u32::from_le_bytes(len_buf) as usize;
        let fingerprint = self.read_payload(fingerprint_len)?.map_err(|got| {
            corrupt(format!(
                "declared fingerprint length {fingerprint_len} exceeds remaining {got} bytes"
            ))
        })?;

        self.offset = start + (2 * LEN_PREFIX + path_len + fingerprint_len) as u64;
        Ok(Some(Record { path, fingerprint }))
    }

    /// Reads exactly `len` bytes; on a short read the inner error carries how
    /// many arrived.
    fn read_payload(&mut self, len: usize) -> io::Result<std::result::Result<Vec<u8>, usize>> {
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        let got = (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        if got < len {
            return Ok(Err(got));
        }
        Ok(Ok(buf))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn layout_is_little_endian_and_length_prefixed() {
        let record = Record::new("a.txt", vec![0xAA, 0xBB]);
        let bytes = encode(&record).unwrap();
        assert_eq!(
            bytes,
            vec![5, 0, 0, 0, b'a', b'.', b't', b'x', b't', 2, 0, 0, 0, 0xAA, 0xBB]
        );
        assert_eq!(bytes.len(), record.encoded_len());
    }

    #[test]
    fn decode_reads_one_record_per_call() {
        let first = Record::new("one", vec![1u8; 32]);
        let second = Record::new("two", vec![2u8; 64]);
        let mut bytes = encode(&first).unwrap();
        bytes.extend(encode(&second).unwrap());

        let mut cursor = Cursor::new(bytes);
        assert_eq!(decode(&mut cursor).unwrap(), Some(first));
        assert_eq!(decode(&mut cursor).unwrap(), Some(second));
        assert_eq!(decode(&mut cursor).unwrap(), None);
    }

    #[test]
    fn empty_path_is_rejected() {
        let err = encode(&Record::new("", vec![1, 2, 3])).unwrap_err();
        assert!(matches!(err, LogError::EmptyPath));
    }

    #[test]
    fn empty_fingerprint_is_allowed() {
        let record = Record::new("x", Vec::new());
        let bytes = encode(&record).unwrap();
        assert_eq!(decode(&mut Cursor::new(bytes)).unwrap(), Some(record));
    }

    #[test]
    fn truncated_length_prefix_is_corruption() {
        let mut cursor = Cursor::new(vec![3u8, 0]);
        let err = decode(&mut cursor).unwrap_err();
        assert!(err.is_corruption(), "{err}");
    }

    #[test]
    fn path_longer_than_stream_is_corruption() {
        let mut bytes = 100u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        let err = decode(&mut Cursor::new(bytes)).unwrap_err();
        match err {
            LogError::Corrupt { offset, reason } => {
                assert_eq!(offset, 0);
                assert!(reason.contains("declared path length 100"), "{reason}");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_fingerprint_prefix_is_corruption() {
        let mut bytes = 1u32.to_le_bytes().to_vec();
        bytes.push(b'p');
        let err = decode(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn huge_declared_length_does_not_allocate() {
        let mut bytes = u32::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        assert!(decode(&mut Cursor::new(bytes)).unwrap_err().is_corruption());
    }

    #[test]
    fn non_utf8_path_is_corruption() {
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert!(decode(&mut Cursor::new(bytes)).unwrap_err().is_corruption());
    }

    #[test]
    fn reader_reports_offset_of_the_bad_record() {
        let good = Record::new("good", vec![9u8; 4]);
        let mut bytes = encode(&good).unwrap();
        let good_len = bytes.len() as u64;
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(b"ab");

        let mut reader = RecordReader::new(Cursor::new(bytes));
        assert_eq!(reader.next().unwrap().unwrap(), good);
        assert_eq!(reader.offset(), good_len);
        match reader.next().unwrap().unwrap_err() {
            LogError::Corrupt { offset, .. } => assert_eq!(offset, good_len),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn writer_emits_back_to_back_records() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_record(&Record::new("a", vec![1])).unwrap();
        writer.write_record(&Record::new("b", vec![2, 3])).unwrap();
        let bytes = writer.into_inner();
        let records: Vec<_> = RecordReader::new(Cursor::new(bytes))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].fingerprint, vec![2, 3]);
    }
}
