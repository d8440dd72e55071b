//! Re-readable CSV input: file (plain or zstd) or in-memory bytes, row validation,
//! and a per-pass digest so the grouping pass can prove it saw the same rows as the count pass.

use crate::error::{BuildError, Result};
use crate::util::open_with_backoff;
use ahash::RandomState;
use indicatif::ProgressBar;
use std::fmt;
use std::fs;
use std::hash::{BuildHasher, Hasher};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder;

/// Rows with fewer fields than this are malformed: field 1 is the author, the last field the text.
pub const MIN_COLUMNS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd,
}

impl Compression {
    /// `.zst` files are decoded as zstd streams; everything else is read as plain CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("zst") => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

/// An input that can be scanned from the beginning any number of times.
/// Streams that cannot be rewound (stdin, pipes) are deliberately not representable.
#[derive(Clone, Debug)]
pub enum CsvSource {
    File { path: PathBuf, compression: Compression },
    Memory(Vec<u8>),
}

impl CsvSource {
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let compression = Compression::from_path(&path);
        CsvSource::File { path, compression }
    }

    pub fn memory(bytes: impl Into<Vec<u8>>) -> Self {
        CsvSource::Memory(bytes.into())
    }

    pub fn label(&self) -> String {
        match self {
            CsvSource::File { path, .. } => path.display().to_string(),
            CsvSource::Memory(bytes) => format!("<memory: {} bytes>", bytes.len()),
        }
    }

    /// Raw (on-disk) size, used as the progress total for one pass.
    pub fn size_hint(&self) -> u64 {
        match self {
            CsvSource::File { path, .. } => fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            CsvSource::Memory(bytes) => bytes.len() as u64,
        }
    }

    /// Open a fresh reader positioned at the first byte of the input.
    /// When `pb` is set it advances by raw bytes consumed (compressed bytes for zstd).
    pub fn open(&self, read_buf_bytes: usize, pb: Option<&ProgressBar>) -> Result<Box<dyn Read + '_>> {
        let cap = read_buf_bytes.max(8 * 1024);
        match self {
            CsvSource::File { path, compression } => {
                let file = open_with_backoff(path, 16, 50)
                    .map_err(|source| BuildError::InputOpen { path: path.clone(), source })?;
                let raw: Box<dyn Read> = match pb {
                    Some(pb) => Box::new(ProgressReader { inner: file, pb: pb.clone() }),
                    None => Box::new(file),
                };
                match compression {
                    Compression::None => Ok(Box::new(BufReader::with_capacity(cap, raw))),
                    Compression::Zstd => {
                        let mut decoder = Decoder::with_buffer(BufReader::with_capacity(cap, raw))
                            .map_err(|source| BuildError::InputOpen { path: path.clone(), source })?;
                        decoder
                            .window_log_max(31)
                            .map_err(|source| BuildError::InputOpen { path: path.clone(), source })?;
                        Ok(Box::new(decoder))
                    }
                }
            }
            CsvSource::Memory(bytes) => {
                let cursor = io::Cursor::new(bytes.as_slice());
                match pb {
                    Some(pb) => Ok(Box::new(ProgressReader { inner: cursor, pb: pb.clone() })),
                    None => Ok(Box::new(cursor)),
                }
            }
        }
    }
}

/// A `Read` wrapper that advances a byte progress bar.
pub struct ProgressReader<R: Read> {
    inner: R,
    pb: ProgressBar,
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pb.inc(n as u64);
        Ok(n)
    }
}

/// One validated input record, borrowed from the CSV reader for the duration of a callback.
#[derive(Clone, Copy, Debug)]
pub struct Row<'a> {
    pub line: u64,
    pub key: &'a str,
    pub payload: &'a str,
}

/// Summary of the logical content seen by one pass: row count plus an order-sensitive hash
/// of every key and payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassDigest {
    pub rows: u64,
    pub hash: u64,
}

impl fmt::Display for PassDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows, digest {:016x}", self.rows, self.hash)
    }
}

struct DigestBuilder {
    rows: u64,
    hasher: ahash::AHasher,
}

impl DigestBuilder {
    fn new() -> Self {
        // Fixed seeds: both passes must hash identically.
        let state = RandomState::with_seeds(
            0x7477_6565_7464_6231,
            0x0123_4567_89ab_cdef,
            0xfeed_face_cafe_beef,
            0x0bad_c0de_dead_f00d,
        );
        Self { rows: 0, hasher: state.build_hasher() }
    }

    #[inline]
    fn push(&mut self, key: &str, payload: &str) {
        self.rows += 1;
        self.hasher.write_usize(key.len());
        self.hasher.write(key.as_bytes());
        self.hasher.write_usize(payload.len());
        self.hasher.write(payload.as_bytes());
    }

    fn finish(self) -> PassDigest {
        PassDigest { rows: self.rows, hash: self.hasher.finish() }
    }
}

/// Scan every CSV record of `input` (no header row, quoted fields allowed),
/// validate the column count and hand each row to `on_row`.
/// The first read error, malformed row or callback error aborts the scan.
pub fn scan_rows<R: Read>(input: R, mut on_row: impl FnMut(Row<'_>) -> Result<()>) -> Result<PassDigest> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut record = csv::StringRecord::new();
    let mut digest = DigestBuilder::new();

    while rdr.read_record(&mut record)? {
        let line = record.position().map(|p| p.line()).unwrap_or(digest.rows + 1);
        if record.len() < MIN_COLUMNS {
            return Err(BuildError::MalformedRow { line, fields: record.len() });
        }
        let key = &record[1];
        let payload = &record[record.len() - 1];
        digest.push(key, payload);
        on_row(Row { line, key, payload })?;
    }
    Ok(digest.finish())
}
