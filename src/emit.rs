//! Sorted hand-off of packed posts to a consumer through a single-slot channel.
//!
//! A scoped producer thread walks authors in ascending order and sends one `Record` at a time;
//! the consumer runs on the calling thread. At most one record is in flight.

use crate::db::Record;
use crate::error::{BuildError, Result};
use crate::grouping::PackedGroups;
use crossbeam_channel::{bounded, Receiver};
use std::thread;

pub const CONDUIT_CAPACITY: usize = 1;

/// What the producer handed off before the channel closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub authors: u64,
    pub records: u64,
    /// False when the consumer hung up before every record was sent.
    pub completed: bool,
}

/// Stream every retained post, authors ascending and posts in input order, into `consume`.
///
/// `consume` receives the channel's receiving end and should read it until it is closed.
/// Returning early (with `Ok` or `Err`) drops the receiver, which unblocks and stops
/// the producer; the consumer's result is returned as-is.
pub fn stream_sorted<'a, T, F>(groups: &'a PackedGroups, consume: F) -> Result<(T, EmitStats)>
where
    F: FnOnce(Receiver<Record<'a>>) -> Result<T>,
{
    let keys = groups.sorted_keys();

    thread::scope(|s| -> Result<(T, EmitStats)> {
        let (tx, rx) = bounded::<Record<'a>>(CONDUIT_CAPACITY);

        let producer = s.spawn(move || {
            let mut stats = EmitStats::default();
            for key in keys {
                let Some(views) = groups.views(key) else { continue };
                stats.authors += 1;
                for &view in views {
                    let rec = Record { user: key.as_bytes(), body: groups.payload(view) };
                    if tx.send(rec).is_err() {
                        tracing::debug!(records = stats.records, "consumer closed the channel early");
                        return stats;
                    }
                    stats.records += 1;
                }
            }
            // Returning drops `tx`, which closes the channel.
            stats.completed = true;
            stats
        });

        let consumed = consume(rx);
        let stats = producer
            .join()
            .map_err(|_| BuildError::Emitter("producer thread panicked".to_string()))?;
        Ok((consumed?, stats))
    })
}
