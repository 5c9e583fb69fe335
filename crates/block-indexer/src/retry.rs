//! Bounded retry for node calls

use crate::error::{BlockIndexerError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry of transient node failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `call` until it succeeds, fails permanently, or the attempts run out.
    ///
    /// Only [`node_rpc::RpcError::Transient`] failures are retried. Running out
    /// of attempts yields [`BlockIndexerError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = node_rpc::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation, attempt, self.max_attempts, self.delay, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(BlockIndexerError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_rpc::RpcError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = quick(3)
            .run("getblockcount", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RpcError::Transient("connection refused".into()))
                } else {
                    Ok(7u64)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let calls = AtomicU32::new(0);
        let err = quick(3)
            .run("getblock", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RpcError::Transient("timed out".into()))
            })
            .await
            .unwrap_err();

        assert!(err.is_retries_exhausted());
        assert!(matches!(err, BlockIndexerError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = quick(5)
            .run("getblockhash", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RpcError::NotFound("Block height out of range".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BlockIndexerError::Rpc(RpcError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
