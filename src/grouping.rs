//! Second pass: pack every retained post into one contiguous buffer and remember,
//! per author, the byte ranges of their posts in input order.
//! No per-post allocation: one growable `Vec<u8>` plus `(start, end)` pairs.

use crate::counting::KeyCounts;
use crate::error::{BuildError, Result};
use crate::mem::LowMemoryWatch;
use crate::source::{scan_rows, PassDigest};
use ahash::AHashMap;
use std::io::Read;

/// Authors with fewer posts than this carry too little signal and are dropped.
pub const MIN_POSTS_PER_AUTHOR: u64 = 2;

const LOW_MEMORY_FRAC: f64 = 0.05;
const MEMORY_CHECK_EVERY: u64 = 64 * 1024;

/// Byte range of one post inside the packed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadView {
    pub start: usize,
    pub end: usize,
}

impl PayloadView {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Retained posts grouped by author. Frozen once built: only read through views.
#[derive(Debug)]
pub struct PackedGroups {
    buffer: Vec<u8>,
    groups: AHashMap<String, Vec<PayloadView>>,
    digest: PassDigest,
}

impl PackedGroups {
    #[inline]
    pub fn payload(&self, view: PayloadView) -> &[u8] {
        &self.buffer[view.start..view.end]
    }

    /// Views for `key` in input order, or `None` if the author was not retained.
    pub fn views(&self, key: &str) -> Option<&[PayloadView]> {
        self.groups.get(key).map(|v| v.as_slice())
    }

    pub fn author_count(&self) -> usize {
        self.groups.len()
    }

    pub fn record_count(&self) -> u64 {
        self.groups.values().map(|v| v.len() as u64).sum()
    }

    pub fn payload_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn digest(&self) -> PassDigest {
        self.digest
    }

    /// Retained authors in ascending byte-wise order.
    pub fn sorted_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.groups.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }
}

/// Re-scan the input and pack the posts of every author with at least
/// `MIN_POSTS_PER_AUTHOR` rows in `counts`.
///
/// `input` must yield the same rows as the scan that produced `counts`; the pass digests
/// are compared at the end and a mismatch is reported as `SourceChanged`.
pub fn group_payloads<R: Read>(input: R, counts: &KeyCounts) -> Result<PackedGroups> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut groups: AHashMap<String, Vec<PayloadView>> = AHashMap::with_capacity(counts.retained(MIN_POSTS_PER_AUTHOR).0);
    let mut watch = LowMemoryWatch::new(LOW_MEMORY_FRAC, MEMORY_CHECK_EVERY);

    let digest = scan_rows(input, |row| {
        let n = counts.get(row.key);
        if n < MIN_POSTS_PER_AUTHOR {
            return Ok(());
        }
        let start = buffer.len();
        buffer.extend_from_slice(row.payload.as_bytes());
        let view = PayloadView { start, end: buffer.len() };
        match groups.get_mut(row.key) {
            Some(views) => views.push(view),
            None => {
                let mut views = Vec::with_capacity(n as usize);
                views.push(view);
                groups.insert(row.key.to_string(), views);
            }
        }
        watch.tick(buffer.len());
        Ok(())
    })?;

    let first = counts.digest();
    if first != digest {
        return Err(BuildError::SourceChanged { first, second: digest });
    }

    buffer.shrink_to_fit();
    Ok(PackedGroups { buffer, groups, digest })
}
