#[path = "common/mod.rs"]
mod common;

use std::fs;
use std::io::Cursor;
use tweetdb::{write_db, BuildError, DbReader, DbWriter, Record, DB_MAGIC};

fn rec<'a>(user: &'a str, body: &'a str) -> Record<'a> {
    Record { user: user.as_bytes(), body: body.as_bytes() }
}

fn sample_db() -> Vec<u8> {
    let mut buf = Vec::new();
    write_db(
        &mut buf,
        vec![rec("ann", "a1"), rec("ann", "a2"), rec("ben", ""), rec("ben", "b2"), rec("cat", "c1"), rec("cat", "c2")],
    )
    .unwrap();
    buf
}

/// Lookups return each user's posts in the order they were written.
#[test]
fn reader_finds_users_and_posts() {
    let bytes = sample_db();
    assert_eq!(&bytes[..4], &DB_MAGIC);
    assert_eq!(&bytes[bytes.len() - 4..], &DB_MAGIC);

    let mut db = DbReader::new(Cursor::new(bytes)).unwrap();
    let names: Vec<&str> = db.users().iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["ann", "ben", "cat"]);
    assert_eq!(db.record_count(), 6);
    assert_eq!(db.find("ben").map(|u| u.count), Some(2));

    let ben = db.posts("ben").unwrap().unwrap();
    assert_eq!(ben, vec![b"".to_vec(), b"b2".to_vec()]);
    let cat = db.posts("cat").unwrap().unwrap();
    assert_eq!(cat, vec![b"c1".to_vec(), b"c2".to_vec()]);
    assert!(db.posts("dan").unwrap().is_none());

    let summary = db.verify().unwrap();
    assert_eq!((summary.users, summary.records), (3, 6));
}

/// The writer refuses users that would break the grouped, ascending layout.
#[test]
fn writer_rejects_out_of_order_users() {
    let mut w = DbWriter::new(Vec::new()).unwrap();
    w.append(rec("bob", "1")).unwrap();
    w.append(rec("carl", "2")).unwrap();

    let err = w.append(rec("bob", "3")).unwrap_err();
    assert!(matches!(err, BuildError::Sink(_)), "{err}");
    let err = w.append(rec("al", "4")).unwrap_err();
    assert!(matches!(err, BuildError::Sink(_)), "{err}");

    // Rejected appends leave the writer usable.
    w.append(rec("carl", "5")).unwrap();
    let summary = w.finish().unwrap();
    assert_eq!((summary.users, summary.records), (2, 3));
}

#[test]
fn truncated_file_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let bytes = sample_db();
    let path = tmp.path().join("cut.db");
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    match DbReader::open(&path) {
        Err(BuildError::InvalidDb(_)) => {}
        Err(other) => panic!("expected InvalidDb, got {other}"),
        Ok(_) => panic!("truncated database was accepted"),
    }
}

/// A corrupted length prefix is caught by a full verify.
#[test]
fn verify_detects_corrupt_record_length() {
    let mut bytes = sample_db();
    // First record length lives right after the 8-byte header.
    bytes[8..12].copy_from_slice(&3u32.to_le_bytes());

    let mut db = DbReader::new(Cursor::new(bytes)).unwrap();
    let err = db.verify().unwrap_err();
    assert!(matches!(err, BuildError::InvalidDb(_)), "{err}");
}

#[test]
fn not_a_database() {
    let err = DbReader::new(Cursor::new(b"user,text\nann,hello there, this is csv\n".to_vec()))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidDb(_)), "{err}");
}

/// Byte offsets of each index entry's `count` field, found by walking the index.
fn count_field_offsets(bytes: &[u8]) -> Vec<usize> {
    let footer = bytes.len() - 28;
    let mut pos = u64::from_le_bytes(bytes[footer..footer + 8].try_into().unwrap()) as usize;
    let mut out = Vec::new();
    while pos < footer {
        let name_len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        out.push(pos + 4 + name_len + 8);
        pos += 4 + name_len + 16;
    }
    out
}

/// Index counts that overflow when summed are reported, not trusted.
#[test]
fn overflowing_index_counts_are_rejected() {
    let mut bytes = sample_db();
    let counts = count_field_offsets(&bytes);
    assert_eq!(counts.len(), 3);
    for &at in &counts[..2] {
        bytes[at..at + 8].copy_from_slice(&(1u64 << 63).to_le_bytes());
    }

    let err = DbReader::new(Cursor::new(bytes)).map(|_| ()).unwrap_err();
    assert!(matches!(err, BuildError::InvalidDb(_)), "{err}");
}

/// A maximal length prefix fails the bounds check on lookup and on verify.
#[test]
fn huge_record_length_is_rejected() {
    let mut bytes = sample_db();
    bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());

    let mut db = DbReader::new(Cursor::new(bytes)).unwrap();
    let err = db.posts("ann").unwrap_err();
    assert!(matches!(err, BuildError::InvalidDb(_)), "{err}");
    let err = db.verify().unwrap_err();
    assert!(matches!(err, BuildError::InvalidDb(_)), "{err}");
}
