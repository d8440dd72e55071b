use crate::source::PassDigest;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("cannot open input {}: {source}", path.display())]
    InputOpen { path: PathBuf, source: io::Error },
    #[error("read input: {source}")]
    InputRead {
        #[from]
        source: csv::Error,
    },
    #[error("row {line}: expected at least 3 columns, found {fields}")]
    MalformedRow { line: u64, fields: usize },
    #[error("input changed between passes (pass 1: {first}, pass 2: {second})")]
    SourceChanged { first: PassDigest, second: PassDigest },
    #[error("cannot create output {}: {source}", path.display())]
    OutputCreate { path: PathBuf, source: io::Error },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("database writer rejected input: {0}")]
    Sink(String),
    #[error("invalid database file: {0}")]
    InvalidDb(String),
    #[error("record producer failed: {0}")]
    Emitter(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
