//! Cancellable poll-until-defined.

use std::time::Duration;

use helmdock_core::{DockError, DockResult};
use tokio_util::sync::CancellationToken;

/// Poll `check` every `interval` until it yields a value or `cancel` fires.
///
/// The check runs once immediately, so an already-available value returns
/// without suspending.
pub async fn wait_until_defined<T, F>(mut check: F, interval: Duration, cancel: &CancellationToken) -> DockResult<T>
where
    F: FnMut() -> Option<T>,
{
    loop {
        if cancel.is_cancelled() {
            return Err(DockError::Cancelled);
        }
        if let Some(v) = check() {
            return Ok(v);
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(DockError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Poll a boolean condition; see [`wait_until_defined`].
pub async fn wait_until<P>(mut pred: P, interval: Duration, cancel: &CancellationToken) -> DockResult<()>
where
    P: FnMut() -> bool,
{
    wait_until_defined(|| pred().then_some(()), interval, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_immediately_when_defined() {
        let cancel = CancellationToken::new();
        let v = wait_until_defined(|| Some(5), Duration::from_secs(60), &cancel).await.unwrap();
        assert_eq!(v, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_value_appears() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let v = wait_until_defined(
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                (n >= 3).then_some(n)
            },
            Duration::from_millis(100),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(v, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_waiting() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            child.cancel();
        });
        let res: DockResult<()> = wait_until_defined(|| None, Duration::from_millis(100), &cancel).await;
        assert_eq!(res, Err(DockError::Cancelled));
    }

    #[tokio::test]
    async fn condition_wait_resolves_once_true() {
        let cancel = CancellationToken::new();
        let mut n = 0;
        wait_until(
            || {
                n += 1;
                n == 3
            },
            Duration::from_millis(1),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(n, 3);
    }
}
