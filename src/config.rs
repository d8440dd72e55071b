use crate::source::Compression;
use std::path::{Path, PathBuf};

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub compression: Option<Compression>, // None: detect from the input extension
    pub progress: bool,                   // show progress bars
    pub verify: bool,                     // re-read and check the finished database
    pub stats_path: Option<PathBuf>,      // write a JSON BuildSummary here

    // IO tuning
    pub read_buffer_bytes: usize,  // BufReader capacity
    pub write_buffer_bytes: usize, // BufWriter capacity
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            compression: None,
            progress: true,
            verify: false,
            stats_path: None,
            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl BuildOptions {
    pub fn with_input(mut self, path: impl AsRef<Path>) -> Self {
        self.input = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn with_output(mut self, path: impl AsRef<Path>) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_verify(mut self, yes: bool) -> Self {
        self.verify = yes;
        self
    }
    pub fn with_stats_path(mut self, path: impl AsRef<Path>) -> Self {
        self.stats_path = Some(path.as_ref().to_path_buf());
        self
    }

    // IO buffers tuning
    pub fn with_io_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }
    pub fn with_io_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }
}
