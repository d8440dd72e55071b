use anyhow::Result;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use tweetdb::{init_tracing_once, DbBuilder};

/// Build a tweet-author database from a CSV export (field 1: author, last field: text).
/// Authors with fewer than two posts are dropped.
/// Flags may also be written with a single dash (`-in`, `-out`).
#[derive(Parser, Debug)]
#[command(name = "build_db", version)]
struct Args {
    /// Input CSV file; `.zst` files are decompressed on the fly
    #[arg(long = "in", value_name = "CSV")]
    input: PathBuf,

    /// Output database file
    #[arg(long = "out", value_name = "DB")]
    output: PathBuf,

    /// Write build counters as JSON to this path
    #[arg(long, value_name = "JSON")]
    stats: Option<PathBuf>,

    /// Re-read the finished database and check its structure
    #[arg(long)]
    verify: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

const LONG_FLAGS: [&str; 5] = ["in", "out", "stats", "verify", "no-progress"];

/// Rewrite single-dash long flags (`-in x.csv`, `-out=y.db`) to their `--` form.
fn normalize_flag(arg: OsString) -> OsString {
    let Some(s) = arg.to_str() else { return arg };
    let Some(rest) = s.strip_prefix('-').filter(|r| !r.starts_with('-')) else { return arg };
    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
    if LONG_FLAGS.contains(&name) {
        OsString::from(format!("-{s}"))
    } else {
        arg
    }
}

fn main() -> Result<()> {
    let args = Args::parse_from(std::env::args_os().map(normalize_flag));
    init_tracing_once();

    let mut builder = DbBuilder::new()
        .input(&args.input)
        .output(&args.output)
        .progress(!args.no_progress)
        .verify(args.verify);
    if let Some(stats) = &args.stats {
        builder = builder.stats_path(stats);
    }

    let summary = builder.build()?;
    println!(
        "Wrote {} posts from {} authors ({} of {} input rows kept)",
        summary.records_written, summary.retained_authors, summary.retained_posts, summary.input_rows
    );
    Ok(())
}
