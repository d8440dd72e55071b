//! First pass: how many posts each author has in the whole input.

use crate::error::Result;
use crate::source::{scan_rows, PassDigest};
use ahash::AHashMap;
use std::io::Read;

/// Author -> number of rows, over every valid row (including authors later filtered out).
#[derive(Debug)]
pub struct KeyCounts {
    counts: AHashMap<String, u64>,
    digest: PassDigest,
}

impl KeyCounts {
    #[inline]
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct authors.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total_rows(&self) -> u64 {
        self.digest.rows
    }

    /// Number of authors whose count reaches `min`, and how many rows they own.
    pub fn retained(&self, min: u64) -> (usize, u64) {
        self.counts
            .values()
            .filter(|&&n| n >= min)
            .fold((0, 0), |(authors, rows), &n| (authors + 1, rows + n))
    }

    pub fn digest(&self) -> PassDigest {
        self.digest
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Count rows per author. Fails on the first read error or malformed row; no partial counts.
pub fn count_keys<R: Read>(input: R) -> Result<KeyCounts> {
    let mut counts = AHashMap::<String, u64>::with_capacity(64_000);
    let digest = scan_rows(input, |row| {
        match counts.get_mut(row.key) {
            Some(n) => *n += 1,
            None => {
                counts.insert(row.key.to_string(), 1);
            }
        }
        Ok(())
    })?;
    Ok(KeyCounts { counts, digest })
}
