//! Wall-clock time for session expiry.
//!
//! Session expiry is an absolute instant: it gets persisted, compared
//! across restarts, and has to stay right after the device sleeps. So
//! [`now`] reads `SystemTime` directly. Timers still run on `tokio::time`,
//! which is monotonic and does not advance while the system is suspended;
//! the session actor re-checks expiry against this clock whenever it wakes.
//!
//! With the `test-util` feature the clock is instead derived from the Tokio
//! clock: the first call pins `SystemTime::now()` to
//! `tokio::time::Instant::now()`, and later readings add however far the
//! Tokio clock moved. Under `#[tokio::test(start_paused = true)]` that makes
//! expiry deterministic. [`advance_wall_clock`] then moves wall time alone,
//! the way a suspend does.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::Timestamp;

/// Current wall-clock time in epoch milliseconds.
#[cfg(not(any(test, feature = "test-util")))]
pub fn now() -> Timestamp {
    system_now()
}

fn system_now() -> Timestamp {
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    Timestamp(epoch_ms)
}

#[cfg(any(test, feature = "test-util"))]
mod anchored {
    use std::cell::Cell;
    use std::sync::OnceLock;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::system_now;
    use crate::Timestamp;

    static ANCHOR: OnceLock<(Timestamp, Instant)> = OnceLock::new();

    thread_local! {
        // Per thread, so each current-thread test runtime has its own.
        static WALL_OFFSET: Cell<Duration> = const { Cell::new(Duration::ZERO) };
    }

    /// Current wall-clock time in epoch milliseconds, following the Tokio
    /// clock.
    pub fn now() -> Timestamp {
        let (epoch, anchor) = *ANCHOR.get_or_init(|| (system_now(), Instant::now()));
        let offset = WALL_OFFSET.with(Cell::get);

        let now = Instant::now();
        let base = if now >= anchor {
            epoch.saturating_add(now.saturating_duration_since(anchor))
        } else {
            // A paused test runtime may start before the anchor was taken.
            epoch.saturating_sub(anchor.saturating_duration_since(now))
        };
        base.saturating_add(offset)
    }

    /// Moves wall time forward on this thread without moving the Tokio
    /// clock, as a system suspend would.
    pub fn advance_wall_clock(by: Duration) {
        WALL_OFFSET.with(|offset| offset.set(offset.get().saturating_add(by)));
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use anchored::{advance_wall_clock, now};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_now_follows_paused_tokio_clock() {
        let before = now();

        tokio::time::advance(Duration::from_secs(90)).await;

        let after = now();
        assert_eq!(after.saturating_duration_since(before), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_wall_clock_leaves_tokio_clock_alone() {
        let before = now();
        let tokio_before = tokio::time::Instant::now();

        advance_wall_clock(Duration::from_secs(8 * 3_600));

        assert_eq!(
            now().saturating_duration_since(before),
            Duration::from_secs(8 * 3_600)
        );
        assert_eq!(tokio_before.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_system_now_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(system_now() > Timestamp(1_577_836_800_000));
    }
}
