//! Buffer-lifecycle instrumentation for tests.
//!
//! The stored payload is plain bytes with no drop glue, so leaks and double frees can't be
//! caught by counting element drops; instead the buffer's alloc and release paths report here,
//! and tests assert on the counters. Counters are thread-local, so each test observes only its
//! own buffers.

use std::cell::Cell;

thread_local! {
    static LIVE: Cell<usize> = const { Cell::new(0) };
    static TOTAL: Cell<usize> = const { Cell::new(0) };
}

/// Called by the buffer's allocation path for every record created.
pub fn record_alloc() {
    LIVE.with(|live| live.set(live.get() + 1));
    TOTAL.with(|total| total.set(total.get() + 1));
}

/// Called by the buffer's release path whenever a record is actually freed.
///
/// # Panics
/// Panics if more records have been freed than allocated, which is a double free by another
/// name.
pub fn record_free() {
    LIVE.with(|live| {
        live.set(
            live.get()
                .checked_sub(1)
                .expect("freed a buffer that was never allocated"),
        );
    });
}

/// The number of buffer records currently alive on this thread.
pub fn live_buffers() -> usize {
    LIVE.with(Cell::get)
}

/// The number of buffer records ever allocated on this thread.
pub fn total_allocs() -> usize {
    TOTAL.with(Cell::get)
}

/// A snapshot of the counters, for asserting on what a region of a test allocated and freed.
#[derive(Debug)]
pub struct AllocWatcher {
    live_at_start: usize,
    total_at_start: usize,
}

impl AllocWatcher {
    /// Snapshots the current counters.
    pub fn start() -> AllocWatcher {
        AllocWatcher {
            live_at_start: live_buffers(),
            total_at_start: total_allocs(),
        }
    }

    /// How many records have been allocated since the snapshot.
    pub fn allocated_since(&self) -> usize {
        total_allocs() - self.total_at_start
    }

    /// The change in live records since the snapshot. Zero means everything allocated since has
    /// also been freed.
    pub fn live_delta(&self) -> isize {
        live_buffers() as isize - self.live_at_start as isize
    }
}
