use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install the fmt subscriber once; `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .try_init();
    });
}

/// Return true for transient I/O errors seen on Windows when filter drivers (AV/backup),
/// network volumes or sharing violations get in the way of an open/rename.
/// The raw codes are Windows error codes; elsewhere nothing is retried.
fn is_retriable_io_error(e: &io::Error) -> bool {
    cfg!(windows)
        && matches!(
            e.raw_os_error(),
            // access denied, sharing/lock violation, AV block, device not ready,
            // volume altered, I/O device error, user-mapped section open
            Some(5) | Some(32) | Some(33) | Some(225) | Some(21) | Some(433) | Some(1006) | Some(1117) | Some(1224)
        )
}

/// Run `op` up to `tries` times, sleeping `delay_ms * attempt` between transient failures.
fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let tries = tries.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < tries && is_retriable_io_error(&e) => {
                tracing::debug!(attempt, error = %e, "transient I/O error, retrying");
                sleep(Duration::from_millis(delay_ms.saturating_mul(attempt as u64)));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || File::open(path))
}

pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || File::create(path))
}

/// Remove a file; succeeds if it does not exist.
pub fn remove_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> Result<()> {
    match with_backoff(tries, delay_ms, || fs::remove_file(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Atomically replace `dest` with `tmp`. If the rename keeps failing (e.g. sharing
/// violations on Windows), fall back to copy + remove. `dest` is only touched by the
/// copy itself; on error `tmp` is left in place for the caller to discard.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    let tries = 20usize;
    let delay_ms = 50u64;
    if let Err(e) = with_backoff(tries, delay_ms, || fs::rename(tmp, dest)) {
        tracing::debug!(error = %e, "rename failed, copying instead");
        with_backoff(tries, delay_ms, || fs::copy(tmp, dest))
            .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
        remove_with_backoff(tmp, tries, delay_ms)?;
    }
    Ok(())
}
