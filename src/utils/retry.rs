use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry an async operation with exponential backoff
///
/// `op` receives the 1-based attempt number. Errors for which `should_retry`
/// returns false are returned immediately.
pub async fn retry_async<F, Fut, T, E, P>(
    mut op: F,
    attempts: usize,
    initial_delay: Duration,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = attempts.max(1);
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts && should_retry(&e) => {
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, ()> = retry_async(
            |_| {
                let current = counter.fetch_add(1, Ordering::Relaxed);
                async move {
                    if current < 2 {
                        Err(())
                    } else {
                        Ok(7)
                    }
                }
            },
            4,
            Duration::from_millis(1),
            |_| true,
        )
        .await;

        assert_eq!(res, Ok(7));
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_stops_on_fatal_error_and_attempt_budget() {
        let counter = AtomicUsize::new(0);
        let res: Result<(), &str> = retry_async(
            |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Err("fatal") }
            },
            5,
            Duration::from_millis(1),
            |e| *e != "fatal",
        )
        .await;
        assert_eq!(res, Err("fatal"));
        assert_eq!(counter.load(Ordering::Relaxed), 1);

        let counter = AtomicUsize::new(0);
        let res: Result<(), &str> = retry_async(
            |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Err("busy") }
            },
            3,
            Duration::from_millis(1),
            |_| true,
        )
        .await;
        assert_eq!(res, Err("busy"));
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }
}
