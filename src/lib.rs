mod config;
mod error;
mod util;
mod mem;
mod progress;

mod source;
mod counting;
mod grouping;
mod emit;
mod db;
mod pipeline;

pub use crate::config::BuildOptions;
pub use crate::error::{BuildError, Result};
pub use crate::pipeline::{BuildSummary, DbBuilder};

// Passes over re-readable CSV input.
pub use crate::source::{scan_rows, Compression, CsvSource, PassDigest, Row, MIN_COLUMNS};
pub use crate::counting::{count_keys, KeyCounts};
pub use crate::grouping::{group_payloads, PackedGroups, PayloadView, MIN_POSTS_PER_AUTHOR};

// Sorted single-slot hand-off to a consumer.
pub use crate::emit::{stream_sorted, EmitStats, CONDUIT_CAPACITY};

// Database format.
pub use crate::db::{write_db, DbReader, DbSummary, DbWriter, Record, UserEntry, DB_MAGIC, DB_VERSION};

// Expose tracing init so binaries can share it.
pub use crate::util::init_tracing_once;
