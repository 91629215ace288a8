//! Cancellable timed retry.

use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Polling gave up before the condition held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("condition not met within {0:?}")]
pub struct Elapsed(pub Duration);

/// Check `probe` every `interval` until it yields a value or `timeout` elapses.
///
/// The first check happens one interval after the call. A check due at the
/// same instant as the timeout still runs before the timeout fires. Both
/// timers are owned by the returned future, so settling or dropping it
/// cancels them.
pub async fn poll_until<T, F>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<T, Elapsed>
where
    F: FnMut() -> Option<T>,
{
    let start = Instant::now();
    let mut ticker = time::interval_at(start + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = time::sleep_until(start + timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = ticker.tick() => {
                if let Some(value) = probe() {
                    return Ok(value);
                }
            }
            _ = &mut deadline => return Err(Elapsed(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const INTERVAL: Duration = Duration::from_millis(100);
    const TIMEOUT: Duration = Duration::from_millis(2000);

    #[tokio::test(start_paused = true)]
    async fn resolves_on_first_tick_after_condition() {
        let start = Instant::now();
        let ready_at = start + Duration::from_millis(250);

        let value = poll_until(INTERVAL, TIMEOUT, || (Instant::now() >= ready_at).then_some(7))
            .await
            .unwrap();

        assert_eq!(value, 7);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn never_checks_before_first_interval() {
        let checks = Cell::new(0);
        let start = Instant::now();

        poll_until(INTERVAL, TIMEOUT, || {
            checks.set(checks.get() + 1);
            Some(())
        })
        .await
        .unwrap();

        assert_eq!(checks.get(), 1);
        assert!(start.elapsed() >= INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_one_interval_of_deadline() {
        let checks = Cell::new(0u32);
        let start = Instant::now();

        let err = poll_until(INTERVAL, TIMEOUT, || {
            checks.set(checks.get() + 1);
            None::<()>
        })
        .await
        .unwrap_err();

        assert_eq!(err, Elapsed(TIMEOUT));
        let elapsed = start.elapsed();
        assert!(elapsed >= TIMEOUT, "{elapsed:?}");
        assert!(elapsed <= TIMEOUT + INTERVAL, "{elapsed:?}");
        assert_eq!(checks.get(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels_polling() {
        let checks = Cell::new(0u32);
        {
            let polling = poll_until(INTERVAL, TIMEOUT, || {
                checks.set(checks.get() + 1);
                None::<()>
            });
            let _ = time::timeout(Duration::from_millis(350), polling).await;
        }
        let seen = checks.get();
        time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(checks.get(), seen);
        assert_eq!(seen, 3);
    }
}
