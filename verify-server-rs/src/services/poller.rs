use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::WorkflowError;

/// How often to ask, and for how long, before giving up on a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Outcome of one poll attempt.
pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Call `check` every `policy.interval` until it is ready, fails, or
/// `policy.timeout` elapses. The first check runs immediately.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, what: &str, mut check: F) -> Result<T, WorkflowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, WorkflowError>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;

    loop {
        if let Poll::Ready(value) = check().await? {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WorkflowError::Timeout {
                what: what.to_string(),
                waited_secs: now.duration_since(started).as_secs(),
            });
        }
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_a_few_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let policy = PollPolicy::new(Duration::from_secs(30), Duration::from_secs(600));

        let value = poll_until(policy, "restore", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(Poll::Pending)
                } else {
                    Ok(Poll::Ready("done"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let policy = PollPolicy::new(Duration::from_secs(30), Duration::from_secs(90));
        let err = poll_until(policy, "scan task", || async { Ok::<Poll<()>, _>(Poll::Pending) })
            .await
            .unwrap_err();
        match err {
            WorkflowError::Timeout { what, waited_secs } => {
                assert_eq!(what, "scan task");
                assert!(waited_secs >= 90);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_stops_polling() {
        let policy = PollPolicy::new(Duration::from_secs(1), Duration::from_secs(10));
        let err = poll_until(policy, "restore", || async {
            Err::<Poll<()>, _>(WorkflowError::external("backup", "denied"))
        })
        .await
        .unwrap_err();
        assert_eq!(err, WorkflowError::external("backup", "denied"));
    }
}
