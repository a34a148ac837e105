//! Bounded concurrency, per-call timeout and retry for collaborator calls.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use regwatch_embed::EmbedError;
use regwatch_judge::JudgeError;
use regwatch_vecstore::VecError;

use crate::config::InfraConfig;
use crate::error::{ComplianceError, Result};

/// Collaborator errors that know whether a retry can help.
pub trait Transient: fmt::Display {
    fn is_transient(&self) -> bool;
}

impl Transient for EmbedError {
    fn is_transient(&self) -> bool {
        EmbedError::is_transient(self)
    }
}

impl Transient for VecError {
    fn is_transient(&self) -> bool {
        VecError::is_transient(self)
    }
}

impl Transient for JudgeError {
    fn is_transient(&self) -> bool {
        JudgeError::is_transient(self)
    }
}

/// A pool of call permits shared by every caller of one path.
#[derive(Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl Gate {
    pub fn new(max_concurrency: usize, infra: &InfraConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout: Duration::from_millis(infra.call_timeout_ms),
            max_retries: infra.max_retries,
            backoff_base: Duration::from_millis(infra.backoff_base_ms),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `f` under a permit with a timeout. Timeouts and transient errors
    /// are retried with exponential backoff; the permit is released while
    /// backing off.
    pub async fn call<T, E, F, Fut>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Transient,
    {
        let mut last = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff_base * (1u32 << (attempt - 1).min(16));
                debug!(op, attempt, backoff_ms = backoff.as_millis() as u64, error = %last, "retrying");
                tokio::time::sleep(backoff).await;
            }

            let permit = self.permits.acquire().await.map_err(|_| {
                ComplianceError::TransientInfra {
                    op: op.to_string(),
                    attempts: attempt,
                    message: "gate closed".into(),
                }
            })?;
            let outcome = tokio::time::timeout(self.timeout, f()).await;
            drop(permit);

            match outcome {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) if e.is_transient() => last = e.to_string(),
                Ok(Err(e)) => {
                    return Err(ComplianceError::Collaborator {
                        op: op.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(_) => last = format!("timed out after {} ms", self.timeout.as_millis()),
            }
        }

        let attempts = self.max_retries + 1;
        warn!(op, attempts, error = %last, "retries exhausted");
        Err(ComplianceError::TransientInfra {
            op: op.to_string(),
            attempts,
            message: last,
        })
    }

    /// Like [`Gate::call`] for synchronous index operations, which run on the
    /// blocking thread pool.
    pub async fn blocking<T, F>(&self, op: &str, f: F) -> Result<T>
    where
        F: Fn() -> std::result::Result<T, VecError> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        self.call(op, || {
            let f = Arc::clone(&f);
            async move {
                match tokio::task::spawn_blocking(move || f()).await {
                    Ok(r) => r,
                    Err(e) => Err(VecError::Backend(format!("blocking task: {e}"))),
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ErrorKind;

    fn infra(max_retries: u32) -> InfraConfig {
        InfraConfig {
            max_concurrency: 2,
            call_timeout_ms: 100,
            max_retries,
            backoff_base_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let gate = Gate::new(2, &infra(2));
        let calls = AtomicU32::new(0);
        let got = gate
            .call("embed", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EmbedError::Http { status: 503, body: String::new() })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(got, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_is_transient_infra() {
        let gate = Gate::new(2, &infra(1));
        let calls = AtomicU32::new(0);
        let err = gate
            .call("embed", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(EmbedError::Transport("reset".into())) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientInfra);
        assert!(matches!(err, ComplianceError::TransientInfra { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_not_retried() {
        let gate = Gate::new(2, &infra(3));
        let calls = AtomicU32::new(0);
        let err = gate
            .call("embed", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(EmbedError::Http { status: 400, body: "bad".into() }) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let gate = Gate::new(1, &infra(0));
        let err = gate
            .call("judge", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, JudgeError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientInfra);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_blocking_runs_off_runtime() {
        let gate = Gate::new(1, &infra(0));
        let got = gate.blocking("index.len", || Ok(41 + 1)).await.unwrap();
        assert_eq!(got, 42);

        let err = gate
            .blocking("index.query", || {
                Err::<(), _>(VecError::DimensionMismatch { got: 2, want: 3 })
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Collaborator);
    }
}
