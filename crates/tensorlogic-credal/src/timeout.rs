//! Time-bounded invocation of inference tasks.

use std::sync::mpsc::{channel, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::{PgmError, Result};

/// Run `task` on a worker thread and wait at most `timeout` for its result.
///
/// On timeout the worker is detached, not cancelled: it keeps running until
/// the task returns and its result is discarded.
pub fn invoke_with_timeout<T, F>(timeout: Duration, task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = channel();
    let handle = thread::Builder::new()
        .name("pgm-query".into())
        .spawn(move || {
            // the receiver is gone after a timeout
            let _ = tx.send(task());
        })
        .map_err(|e| PgmError::WorkerFailed(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            if handle.join().is_err() {
                return Err(PgmError::WorkerFailed("query thread panicked".to_string()));
            }
            result
        }
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(?timeout, "query did not finish in time");
            Err(PgmError::TimeoutExceeded(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(PgmError::WorkerFailed(
            "query thread exited without a result".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completes_in_time() {
        let value = invoke_with_timeout(Duration::from_secs(5), || Ok(21 * 2)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_task_error_is_forwarded() {
        let err = invoke_with_timeout::<(), _>(Duration::from_secs(5), || {
            Err(PgmError::InconsistentEvidence)
        })
        .unwrap_err();
        assert_eq!(err, PgmError::InconsistentEvidence);
    }

    #[test]
    fn test_timeout() {
        let timeout = Duration::from_millis(20);
        let err = invoke_with_timeout(timeout, || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err, PgmError::TimeoutExceeded(timeout));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_panicking_worker() {
        let err = invoke_with_timeout::<(), _>(Duration::from_secs(5), || panic!("boom"))
            .unwrap_err();
        assert!(matches!(err, PgmError::WorkerFailed(_)));
    }
}
