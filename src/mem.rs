use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

/// Cached, low-overhead memory watcher.
/// - Refreshes at most every `REFRESH_EVERY`.
/// - Uses available/total RAM.
struct MemState {
    sys: System,
    last_check: Instant,
    last_frac: f64, // available / total (0.0..1.0)
}

static STATE: OnceLock<Mutex<MemState>> = OnceLock::new();
const REFRESH_EVERY: Duration = Duration::from_millis(500);

fn with_state<F, T>(f: F) -> T
where
    F: FnOnce(&mut MemState) -> T,
{
    let m = STATE.get_or_init(|| {
        let mut s = System::new();
        s.refresh_memory();
        Mutex::new(MemState {
            sys: s,
            last_check: Instant::now() - REFRESH_EVERY * 2,
            last_frac: 1.0,
        })
    });
    let mut guard = m.lock();
    f(&mut guard)
}

/// Returns a recent estimate of available memory fraction (0.0..1.0).
pub fn available_memory_fraction() -> f64 {
    with_state(|st| {
        let now = Instant::now();
        if now.duration_since(st.last_check) >= REFRESH_EVERY {
            st.sys.refresh_memory();
            let total = st.sys.total_memory() as f64;
            let avail = st.sys.available_memory() as f64;
            st.last_frac = if total > 0.0 { (avail / total).clamp(0.0, 1.0) } else { 1.0 };
            st.last_check = now;
        }
        st.last_frac
    })
}

/// Returns true if the cached available-memory fraction is below `threshold` (e.g., 0.10 for 10%).
pub fn is_low_memory(threshold: f64) -> bool {
    available_memory_fraction() < threshold
}

/// Checks memory every `every` ticks while a pass grows in-memory state,
/// and logs a single warning the first time it runs low. Never throttles.
pub struct LowMemoryWatch {
    threshold: f64,
    every: u64,
    ticks: u64,
    warned: bool,
}

impl LowMemoryWatch {
    pub fn new(threshold: f64, every: u64) -> Self {
        Self { threshold, every: every.max(1), ticks: 0, warned: false }
    }

    #[inline]
    pub fn tick(&mut self, buffered_bytes: usize) {
        self.ticks += 1;
        if self.warned || self.ticks % self.every != 0 {
            return;
        }
        if is_low_memory(self.threshold) {
            self.warned = true;
            tracing::warn!(
                buffered_bytes,
                available = available_memory_fraction(),
                "Available memory is low while packing posts; the grouping pass keeps every retained post in RAM"
            );
        }
    }
}
