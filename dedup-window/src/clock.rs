use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Numbers windows by the wall clock.
///
/// Returns the sequence number of the window containing now, counting windows of
/// length `period` from the Unix epoch, and the time left until that window ends.
/// Processes that start their tracker at this number and their first tick after this
/// delay agree on which window is which, so they can share a store.
///
/// Resolution is one millisecond; shorter periods are treated as one millisecond.
pub fn wall_clock_window(period: Duration) -> (u64, Duration) {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    align(since_epoch, period)
}

fn align(since_epoch: Duration, period: Duration) -> (u64, Duration) {
    let period_ms = period.as_millis().max(1);
    let now_ms = since_epoch.as_millis();
    let window = (now_ms / period_ms) as u64;
    let remaining = (period_ms - now_ms % period_ms) as u64;
    (window, Duration::from_millis(remaining))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_second_windows() {
        let minute = Duration::from_secs(60);

        assert_eq!(
            align(Duration::from_secs(120), minute),
            (2, Duration::from_secs(60))
        );
        assert_eq!(
            align(Duration::from_millis(179_999), minute),
            (2, Duration::from_millis(1))
        );
    }

    #[test]
    fn sub_second_windows_track_the_clock() {
        let period = Duration::from_millis(250);

        let (window, remaining) = align(Duration::from_millis(10_100), period);
        assert_eq!((window, remaining), (40, Duration::from_millis(150)));

        // One tick later the tracker is at window 41, which is the wall clock's number too
        let (next, _) = align(Duration::from_millis(10_100) + remaining, period);
        assert_eq!(next, window + 1);
    }

    #[test]
    fn tiny_periods_do_not_divide_by_zero() {
        let (window, remaining) = align(Duration::from_millis(7), Duration::from_micros(10));
        assert_eq!(window, 7);
        assert_eq!(remaining, Duration::from_millis(1));
    }
}
