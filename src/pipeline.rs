use crate::config::BuildOptions;
use crate::counting::count_keys;
use crate::db::{write_db, DbReader, DbSummary};
use crate::emit::stream_sorted;
use crate::error::BuildError;
use crate::grouping::{group_payloads, PackedGroups, MIN_POSTS_PER_AUTHOR};
use crate::progress::{make_bytes_progress, make_count_progress};
use crate::source::{Compression, CsvSource};
use crate::util::{create_with_backoff, init_tracing_once, remove_with_backoff, replace_file_atomic_backoff};
use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Counters from one build, written by `--stats` as JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub input_rows: u64,
    pub distinct_authors: u64,
    pub retained_authors: u64,
    pub retained_posts: u64,
    pub payload_bytes: u64,
    pub records_written: u64,
    pub output_bytes: u64,
}

#[derive(Clone, Default)]
pub struct DbBuilder {
    pub(crate) opts: BuildOptions,
}

impl DbBuilder {
    pub fn new() -> Self {
        Self { opts: BuildOptions::default() }
    }

    // -------- Builder methods --------
    pub fn input(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_input(path); self }
    pub fn output(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output(path); self }
    pub fn compression(mut self, compression: Compression) -> Self { self.opts = self.opts.with_compression(compression); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn verify(mut self, yes: bool) -> Self { self.opts = self.opts.with_verify(yes); self }
    pub fn stats_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_stats_path(path); self }
    pub fn io_read_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_read_buffer(bytes); self }
    pub fn io_write_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_write_buffer(bytes); self }

    pub fn options(&self) -> &BuildOptions {
        &self.opts
    }

    /// Build the database at the configured output from the configured input file.
    pub fn build(self) -> Result<BuildSummary> {
        let input = self.opts.input.clone().ok_or_else(|| anyhow!("input path is required"))?;
        let output = self.opts.output.clone().ok_or_else(|| anyhow!("output path is required"))?;
        let source = match self.opts.compression {
            Some(compression) => CsvSource::File { path: input, compression },
            None => CsvSource::file(&input),
        };
        self.build_from(&source, &output)
    }

    /// Two passes over `source`, then a sorted streaming write into `output`.
    /// The database is written to `<output>.inprogress` and only promoted on success,
    /// so a failed run never leaves a finalized file behind.
    pub fn build_from(&self, source: &CsvSource, output: &Path) -> Result<BuildSummary> {
        init_tracing_once();
        let read_buf = self.opts.read_buffer_bytes;

        tracing::info!(input = %source.label(), "Counting authors...");
        let pb = self.pass_bar(source, "Counting authors");
        let counts = count_keys(source.open(read_buf, pb.as_ref())?)
            .with_context(|| format!("count authors in {}", source.label()))?;
        finish_bar(pb);

        let (retained_authors, retained_posts) = counts.retained(MIN_POSTS_PER_AUTHOR);
        tracing::info!(
            rows = counts.total_rows(),
            authors = counts.len(),
            retained_authors,
            retained_posts,
            "Counted authors"
        );

        tracing::info!("Grouping posts by author...");
        let pb = self.pass_bar(source, "Grouping posts");
        let groups = group_payloads(source.open(read_buf, pb.as_ref())?, &counts)
            .with_context(|| format!("group posts in {}", source.label()))?;
        finish_bar(pb);

        let mut summary = BuildSummary {
            input_rows: counts.total_rows(),
            distinct_authors: counts.len() as u64,
            retained_authors: groups.author_count() as u64,
            retained_posts: groups.record_count(),
            payload_bytes: groups.payload_bytes() as u64,
            ..Default::default()
        };
        drop(counts);

        tracing::info!(authors = summary.retained_authors, "Sorting authors...");
        tracing::info!(path = %output.display(), "Writing output...");
        let tmp = inprogress_path(output);
        let file = create_with_backoff(&tmp, 16, 50)
            .map_err(|source| BuildError::OutputCreate { path: tmp.clone(), source })?;

        // Write, optionally verify, promote: any failure discards the temp file.
        let finished = self
            .write_sorted(&groups, file)
            .and_then(|db| {
                if self.opts.verify {
                    verify_db(&tmp)?;
                }
                replace_file_atomic_backoff(&tmp, output)?;
                Ok(db)
            });
        let db = match finished {
            Ok(db) => db,
            Err(e) => {
                if let Err(rm) = remove_with_backoff(&tmp, 10, 25) {
                    tracing::warn!(path = %tmp.display(), error = %rm, "could not remove partial output");
                }
                return Err(e.context(format!("write {}", output.display())));
            }
        };
        summary.records_written = db.records;
        summary.output_bytes = db.bytes;
        tracing::info!(users = db.users, records = db.records, bytes = db.bytes, "Database written");

        if let Some(stats) = &self.opts.stats_path {
            write_summary_json(stats, &summary)?;
        }
        Ok(summary)
    }

    fn pass_bar(&self, source: &CsvSource, label: &str) -> Option<ProgressBar> {
        self.opts.progress.then(|| make_bytes_progress(source.size_hint(), label))
    }

    fn write_sorted(&self, groups: &PackedGroups, file: File) -> Result<DbSummary> {
        let writer = BufWriter::with_capacity(self.opts.write_buffer_bytes, file);
        let expected = groups.record_count();
        let pb = self.opts.progress.then(|| make_count_progress(expected, "Writing database"));

        let (db, sent) = stream_sorted(groups, |rx| {
            let records = rx.into_iter().inspect(|_| {
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
            });
            write_db(writer, records)
        })?;
        finish_bar(pb);

        if !sent.completed || sent.records != expected || db.records != expected {
            return Err(BuildError::Sink(format!(
                "expected {expected} records, producer sent {} and the database holds {}",
                sent.records, db.records
            ))
            .into());
        }
        Ok(db)
    }
}

fn finish_bar(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }
}

/// Full structural check of a written database; the reader is closed before returning.
fn verify_db(path: &Path) -> Result<()> {
    let checked = DbReader::open(path)
        .and_then(|mut r| r.verify())
        .with_context(|| format!("verify {}", path.display()))?;
    tracing::info!(users = checked.users, records = checked.records, "Database verified");
    Ok(())
}

fn inprogress_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".inprogress");
    PathBuf::from(name)
}

fn write_summary_json(path: &Path, summary: &BuildSummary) -> Result<()> {
    let file = create_with_backoff(path, 16, 50).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, summary)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}
