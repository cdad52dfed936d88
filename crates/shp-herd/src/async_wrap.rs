// SPDX-License-Identifier: MIT

//! The "async wrap" pattern (spec §9): run an async Herd operation under an
//! outer timeout and reduce the outcome to `(Option<T>, Option<String>)` —
//! a value on success, or a human-readable error string on timeout or
//! failure. Used at least once per scheduler phase (cleanup, prepare,
//! schedule-emulation, wait-completion, fetch logs x2, fetch timestamp,
//! reboot) so a stuck SSH call never blocks the control loop past its
//! phase's budget.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Awaits `fut` with an outer `timeout`, labelling any failure with `label`
/// for the `scheduler_error`/log trail.
pub async fn with_timeout<T, E, F>(timeout: Duration, label: &str, fut: F) -> (Option<T>, Option<String>)
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => (Some(value), None),
        Ok(Err(err)) => (None, Some(format!("{label} failed: {err}"))),
        Err(_) => (None, Some(format!("Timeout ({timeout:?}) during {label}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_on_success() {
        let (value, error) = with_timeout(Duration::from_secs(1), "noop", async { Ok::<_, std::io::Error>(42) }).await;
        assert_eq!(value, Some(42));
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn returns_labelled_error_on_failure() {
        let (value, error): (Option<()>, _) = with_timeout(Duration::from_secs(1), "cleanup", async {
            Err(std::io::Error::other("boom"))
        })
        .await;
        assert!(value.is_none());
        assert!(error.unwrap().contains("cleanup"));
    }

    #[tokio::test]
    async fn returns_timeout_message_when_future_hangs() {
        let (value, error): (Option<()>, _) =
            with_timeout(Duration::from_millis(10), "execution", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, std::io::Error>(())
            })
            .await;
        assert!(value.is_none());
        assert!(error.unwrap().contains("Timeout"));
    }
}
