//! Progress bars for the two input passes (bytes) and the database write (records).

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn styled(total: u64, template: &str, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Byte-style bar for one scan over the input.
pub fn make_bytes_progress(total_bytes: u64, label: &str) -> ProgressBar {
    styled(
        total_bytes,
        "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
         {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
        label,
    )
}

/// Count-style bar (items processed out of total).
pub fn make_count_progress(total: u64, label: &str) -> ProgressBar {
    styled(
        total,
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
        label,
    )
}
