use std::io::Cursor;

use fuzzdex_index::{decode, encode, AppendLog, Record, RecordReader};
use proptest::prelude::*;

proptest! {
    #[test]
    fn record_roundtrip(record in record_strategy()) {
        let bytes = encode(&record).expect("encode");
        prop_assert_eq!(bytes.len(), record.encoded_len());
        let decoded = decode(&mut Cursor::new(bytes)).expect("decode");
        prop_assert_eq!(decoded, Some(record));
    }

    #[test]
    fn stream_roundtrip(records in prop::collection::vec(record_strategy(), 0..12)) {
        let mut bytes = Vec::new();
        for record in &records {
            bytes.extend(encode(record).expect("encode"));
        }
        let decoded = RecordReader::new(Cursor::new(bytes))
            .collect::<Result<Vec<_>, _>>()
            .expect("decode stream");
        prop_assert_eq!(decoded, records);
    }

    #[test]
    fn any_strict_prefix_of_a_record_is_rejected(record in record_strategy(), cut in 1usize..4096) {
        let bytes = encode(&record).expect("encode");
        let cut = cut % bytes.len();
        prop_assume!(cut > 0);
        let err = decode(&mut Cursor::new(&bytes[..cut])).unwrap_err();
        prop_assert!(err.is_corruption());
    }
}

fn record_strategy() -> impl Strategy<Value = Record> {
    (
        "[A-Za-z0-9_./ -]{1,48}",
        prop::collection::vec(any::<u8>(), 0..200),
    )
        .prop_map(|(path, fingerprint)| Record::new(path, fingerprint))
}

#[test]
fn log_truncated_final_record_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let log = AppendLog::new(dir.path().join("file_index"));
    log.append(&Record::new("kept", vec![1u8; 32])).unwrap();
    log.append(&Record::new("lost", vec![2u8; 32])).unwrap();

    let full = std::fs::read(log.path()).unwrap();
    std::fs::write(log.path(), &full[..full.len() - 10]).unwrap();

    let results: Vec<_> = log.scan().unwrap().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().path, "kept");
    assert!(results[1].as_ref().unwrap_err().is_corruption());
}
