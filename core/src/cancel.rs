//! Deadline-armed cancellation tokens
//!
//! A single root [`CancellationToken`] fans out to every component. Bounded
//! phases derive a child that also fires when its deadline passes, so callees
//! only ever watch one token; callers tell the two causes apart afterwards.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A child token that cancels itself after `timeout`
#[derive(Debug)]
pub struct Deadline {
    parent: CancellationToken,
    token: CancellationToken,
    timeout: Duration,
    timer: JoinHandle<()>,
}

impl Deadline {
    /// Arm a deadline under `parent`; must be called inside a tokio runtime
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        let token = parent.child_token();
        let timer_token = token.clone();
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = timer_token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => timer_token.cancel(),
            }
        });
        Self {
            parent: parent.clone(),
            token,
            timeout,
            timer,
        }
    }

    /// Token to hand to callees
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The parent fired
    pub fn is_interrupted(&self) -> bool {
        self.parent.is_cancelled()
    }

    /// The deadline fired while the parent is still live
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() && !self.parent.is_cancelled()
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Sleep for `duration` unless `cancel` fires first; true when fully slept
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_expires() {
        let root = CancellationToken::new();
        let deadline = Deadline::new(&root, Duration::from_millis(20));
        deadline.token().cancelled().await;
        assert!(deadline.is_expired());
        assert!(!deadline.is_interrupted());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancel_is_interruption() {
        let root = CancellationToken::new();
        let deadline = Deadline::new(&root, Duration::from_secs(60));
        root.cancel();
        deadline.token().cancelled().await;
        assert!(deadline.is_interrupted());
        assert!(!deadline.is_expired());
    }

    #[tokio::test]
    async fn test_sleep_or_cancel() {
        let token = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::from_millis(5), &token).await);
        token.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(60), &token).await);
    }
}
