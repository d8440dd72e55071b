//! Author-grouped tweet database: a streaming writer that consumes `(user, body)` records
//! in user order, and a reader that looks users up and verifies whole files.
//!
//! File layout (integers little-endian):
//!   header  : "TWDB" | u32 version
//!   records : { u32 body_len | body }*
//!   index   : { u32 name_len | name | u64 first_record_offset | u64 record_count }*  (one per user, ascending)
//!   footer  : u64 index_offset | u64 user_count | u64 record_count | "TWDB"

use crate::error::{BuildError, Result};
use crate::util::open_with_backoff;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const DB_MAGIC: [u8; 4] = *b"TWDB";
pub const DB_VERSION: u32 = 1;

const HEADER_LEN: u64 = 8;
const FOOTER_LEN: u64 = 28;

/// One post handed to the writer. Borrowed: the writer copies bytes straight to its sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record<'a> {
    pub user: &'a [u8],
    pub body: &'a [u8],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DbSummary {
    pub users: u64,
    pub records: u64,
    pub bytes: u64,
}

struct IndexEntry {
    name: Vec<u8>,
    offset: u64,
    count: u64,
}

/// Sequential database writer.
/// Records of one user must be contiguous and users must arrive in ascending byte order.
pub struct DbWriter<W: Write> {
    dest: W,
    pos: u64,
    records: u64,
    index: Vec<IndexEntry>,
}

impl<W: Write> DbWriter<W> {
    pub fn new(mut dest: W) -> Result<Self> {
        dest.write_all(&DB_MAGIC)?;
        dest.write_u32::<LittleEndian>(DB_VERSION)?;
        Ok(Self { dest, pos: HEADER_LEN, records: 0, index: Vec::new() })
    }

    pub fn append(&mut self, rec: Record<'_>) -> Result<()> {
        let body_len = u32::try_from(rec.body.len())
            .map_err(|_| BuildError::Sink(format!("post of {} bytes exceeds the u32 length limit", rec.body.len())))?;

        let same_user = self.index.last().is_some_and(|e| e.name == rec.user);
        if same_user {
            if let Some(e) = self.index.last_mut() {
                e.count += 1;
            }
        } else {
            if let Some(prev) = self.index.last() {
                if rec.user <= prev.name.as_slice() {
                    return Err(BuildError::Sink(format!(
                        "user {:?} arrived after {:?}; users must be contiguous and ascending",
                        String::from_utf8_lossy(rec.user),
                        String::from_utf8_lossy(&prev.name)
                    )));
                }
            }
            if u32::try_from(rec.user.len()).is_err() {
                return Err(BuildError::Sink(format!("user name of {} bytes is too long", rec.user.len())));
            }
            self.index.push(IndexEntry { name: rec.user.to_vec(), offset: self.pos, count: 1 });
        }

        self.dest.write_u32::<LittleEndian>(body_len)?;
        self.dest.write_all(rec.body)?;
        self.pos += 4 + u64::from(body_len);
        self.records += 1;
        Ok(())
    }

    /// Write the user index and footer, then flush the sink.
    pub fn finish(mut self) -> Result<DbSummary> {
        let index_offset = self.pos;
        for e in &self.index {
            self.dest.write_u32::<LittleEndian>(e.name.len() as u32)?;
            self.dest.write_all(&e.name)?;
            self.dest.write_u64::<LittleEndian>(e.offset)?;
            self.dest.write_u64::<LittleEndian>(e.count)?;
            self.pos += 4 + e.name.len() as u64 + 16;
        }
        let users = self.index.len() as u64;
        self.dest.write_u64::<LittleEndian>(index_offset)?;
        self.dest.write_u64::<LittleEndian>(users)?;
        self.dest.write_u64::<LittleEndian>(self.records)?;
        self.dest.write_all(&DB_MAGIC)?;
        self.pos += FOOTER_LEN;
        self.dest.flush()?;
        Ok(DbSummary { users, records: self.records, bytes: self.pos })
    }
}

/// Consume `records` to exhaustion into a new database on `dest`.
pub fn write_db<'a, W, I>(dest: W, records: I) -> Result<DbSummary>
where
    W: Write,
    I: IntoIterator<Item = Record<'a>>,
{
    let mut w = DbWriter::new(dest)?;
    for rec in records {
        w.append(rec)?;
    }
    w.finish()
}

/// Index entry of one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub offset: u64,
    pub count: u64,
}

pub struct DbReader<R: Read + Seek> {
    inner: R,
    users: Vec<UserEntry>,
    index_offset: u64,
    records: u64,
    len: u64,
}

impl DbReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let f = open_with_backoff(path, 16, 50)?;
        Self::new(BufReader::new(f))
    }
}

fn invalid(msg: impl Into<String>) -> BuildError {
    BuildError::InvalidDb(msg.into())
}

impl<R: Read + Seek> DbReader<R> {
    /// Validate header and footer and load the user index.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        if len < HEADER_LEN + FOOTER_LEN {
            return Err(invalid(format!("file is {len} bytes, shorter than header and footer")));
        }

        inner.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 4];
        inner.read_exact(&mut magic)?;
        if magic != DB_MAGIC {
            return Err(invalid("bad header magic"));
        }
        let version = inner.read_u32::<LittleEndian>()?;
        if version != DB_VERSION {
            return Err(invalid(format!("unsupported version {version}")));
        }

        let index_end = len - FOOTER_LEN;
        inner.seek(SeekFrom::Start(index_end))?;
        let index_offset = inner.read_u64::<LittleEndian>()?;
        let user_count = inner.read_u64::<LittleEndian>()?;
        let records = inner.read_u64::<LittleEndian>()?;
        inner.read_exact(&mut magic)?;
        if magic != DB_MAGIC {
            return Err(invalid("bad footer magic (truncated file?)"));
        }
        if index_offset < HEADER_LEN || index_offset > index_end {
            return Err(invalid(format!("index offset {index_offset} outside file")));
        }

        inner.seek(SeekFrom::Start(index_offset))?;
        // Each entry takes at least 20 bytes; never trust the footer count for allocation.
        let cap = user_count.min((index_end - index_offset) / 20) as usize;
        let mut users = Vec::with_capacity(cap);
        let mut pos = index_offset;
        let mut total = 0u64;
        for _ in 0..user_count {
            let name_len = u64::from(inner.read_u32::<LittleEndian>()?);
            if pos + 4 + name_len + 16 > index_end {
                return Err(invalid("index entry runs past the footer"));
            }
            let mut name = vec![0u8; name_len as usize];
            inner.read_exact(&mut name)?;
            let name = String::from_utf8(name).map_err(|_| invalid("user name is not UTF-8"))?;
            let offset = inner.read_u64::<LittleEndian>()?;
            let count = inner.read_u64::<LittleEndian>()?;
            if offset < HEADER_LEN || offset >= index_offset {
                return Err(invalid(format!("user {name:?} points outside the record region")));
            }
            if let Some(prev) = users.last().map(|u: &UserEntry| u.name.as_str()) {
                if name.as_str() <= prev {
                    return Err(invalid(format!("users out of order at {name:?}")));
                }
            }
            total = total.checked_add(count).ok_or_else(|| invalid("record count overflow in index"))?;
            pos += 4 + name_len + 16;
            users.push(UserEntry { name, offset, count });
        }
        if pos != index_end {
            return Err(invalid("index size does not match footer"));
        }
        if total != records {
            return Err(invalid(format!("index lists {total} records, footer says {records}")));
        }

        Ok(Self { inner, users, index_offset, records, len })
    }

    pub fn users(&self) -> &[UserEntry] {
        &self.users
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }

    pub fn find(&self, user: &str) -> Option<&UserEntry> {
        self.users
            .binary_search_by(|e| e.name.as_str().cmp(user))
            .ok()
            .map(|i| &self.users[i])
    }

    /// All posts of `user` in stored order, or `None` if the user is not in the database.
    pub fn posts(&mut self, user: &str) -> Result<Option<Vec<Vec<u8>>>> {
        let (offset, count) = match self.find(user) {
            Some(e) => (e.offset, e.count),
            None => return Ok(None),
        };
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut pos = offset;
        let mut out = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            let mut body = Vec::new();
            pos = self.read_body(pos, &mut body)?;
            out.push(body);
        }
        Ok(Some(out))
    }

    /// Visit every record in file order.
    pub fn for_each_record(&mut self, mut f: impl FnMut(&str, &[u8]) -> Result<()>) -> Result<()> {
        self.inner.seek(SeekFrom::Start(HEADER_LEN))?;
        let mut pos = HEADER_LEN;
        let mut body = Vec::with_capacity(1024);
        for i in 0..self.users.len() {
            for _ in 0..self.users[i].count {
                pos = self.read_body(pos, &mut body)?;
                f(&self.users[i].name, &body)?;
            }
        }
        Ok(())
    }

    /// Decode the entire record region and check it against the index.
    pub fn verify(&mut self) -> Result<DbSummary> {
        self.inner.seek(SeekFrom::Start(HEADER_LEN))?;
        let mut pos = HEADER_LEN;
        for i in 0..self.users.len() {
            if self.users[i].offset != pos {
                return Err(invalid(format!(
                    "user {:?} starts at {}, expected {}",
                    self.users[i].name, self.users[i].offset, pos
                )));
            }
            for _ in 0..self.users[i].count {
                let body_len = u64::from(self.inner.read_u32::<LittleEndian>()?);
                let next = self.record_end(pos, body_len)?;
                let skipped = io::copy(&mut (&mut self.inner).take(body_len), &mut io::sink())?;
                if skipped != body_len {
                    return Err(invalid("record truncated"));
                }
                pos = next;
            }
        }
        if pos != self.index_offset {
            return Err(invalid(format!("{} unindexed bytes before the index", self.index_offset - pos)));
        }
        Ok(DbSummary { users: self.users.len() as u64, records: self.records, bytes: self.len })
    }

    fn read_body(&mut self, pos: u64, body: &mut Vec<u8>) -> Result<u64> {
        let body_len = u64::from(self.inner.read_u32::<LittleEndian>()?);
        let next = self.record_end(pos, body_len)?;
        body.clear();
        body.resize(body_len as usize, 0);
        self.inner.read_exact(body)?;
        Ok(next)
    }

    /// Offset just past a record starting at `pos`; it must end at or before the index.
    fn record_end(&self, pos: u64, body_len: u64) -> Result<u64> {
        pos.checked_add(4 + body_len)
            .filter(|&end| end <= self.index_offset)
            .ok_or_else(|| invalid(format!("record at {pos} runs into the index")))
    }
}
