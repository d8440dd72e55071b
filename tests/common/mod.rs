#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tweetdb::DbReader;

/// Encode rows as CSV (quoting as needed, rows may differ in length).
pub fn csv_bytes(rows: &[&[&str]]) -> Vec<u8> {
    let mut w = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    for row in rows {
        w.write_record(*row).unwrap();
    }
    w.into_inner().unwrap()
}

/// Write rows to `<dir>/<name>` as plain CSV.
pub fn write_csv(dir: &Path, name: &str, rows: &[&[&str]]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, csv_bytes(rows)).unwrap();
    path
}

/// Write rows to `<dir>/<name>` as a zstd-compressed CSV.
pub fn write_csv_zst(dir: &Path, name: &str, rows: &[&[&str]]) -> PathBuf {
    let path = dir.join(name);
    let f = File::create(&path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    enc.write_all(&csv_bytes(rows)).unwrap();
    enc.finish().unwrap();
    path
}

/// A tweetdump-style row: id, author, timestamp, text.
pub fn tweet<'a>(id: &'a str, user: &'a str, text: &'a str) -> [&'a str; 4] {
    [id, user, "2017-03-01 12:00:00", text]
}

/// Every record of a database, in file order.
pub fn read_db(path: &Path) -> Vec<(String, String)> {
    let mut reader = DbReader::open(path).unwrap();
    let mut out = Vec::new();
    reader
        .for_each_record(|user, body| {
            out.push((user.to_string(), String::from_utf8(body.to_vec()).unwrap()));
            Ok(())
        })
        .unwrap();
    out
}

/// Reference model: authors with >= 2 rows, ascending, posts in input order.
pub fn expected_records(rows: &[(String, String)]) -> Vec<(String, String)> {
    let mut counts = std::collections::BTreeMap::<&str, usize>::new();
    for (user, _) in rows {
        *counts.entry(user.as_str()).or_insert(0) += 1;
    }
    let mut out = Vec::new();
    for (user, n) in counts {
        if n < 2 {
            continue;
        }
        for (u, text) in rows {
            if u == user {
                out.push((u.clone(), text.clone()));
            }
        }
    }
    out
}
