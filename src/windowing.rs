//! Sequential time windowing.
//!
//! A single linear scan over the whole batch in its current order. The
//! window anchor resets to the current trip's time whenever a new window
//! opens. Because the scan ignores destination clusters, interleaved
//! clusters can share a window id; base grouping relies on that.

use chrono::NaiveTime;

/// Default maximum gap to the window anchor, in minutes.
pub const DEFAULT_WINDOW_THRESHOLD_MINUTES: u32 = 10;

/// Assigns a window id to every time, in scan order.
///
/// A new window starts when `|time - anchor|` exceeds `threshold_minutes`.
pub fn assign_time_windows(times: &[NaiveTime], threshold_minutes: u32) -> Vec<usize> {
    let Some(first) = times.first() else {
        return Vec::new();
    };

    let threshold_secs = i64::from(threshold_minutes) * 60;
    let mut anchor = *first;
    let mut window = 0;
    let mut windows = Vec::with_capacity(times.len());

    for time in times {
        let gap = time.signed_duration_since(anchor).num_seconds().abs();
        if gap > threshold_secs {
            window += 1;
            anchor = *time;
        }
        windows.push(window);
    }

    windows
}
