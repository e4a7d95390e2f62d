//! Single retry helper classifying a caught database error into
//! `{Transient, Permanent}` and looping only on `Transient` with bounded
//! exponential backoff (spec §4.D, §9).
//!
//! Every call site owns exactly one unit of work: acquire a connection
//! (implicitly, via the pool), run the closure, and let the pool return
//! the connection on drop. No session is ever held across an `.await`
//! that calls out to the LLM runtime, TTS, or blob storage — callers
//! enforce that by construction, since `retry_db` only ever wraps a
//! single short-lived query.

use std::future::Future;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_MS: [u64; 3] = [500, 1000, 2000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Classify a `sqlx::Error` as transient (connection reset, SSL drop,
/// timeout, closed connection) or permanent (constraint violation,
/// not-found, syntax error).
pub fn classify(err: &sqlx::Error) -> ErrorClass {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ErrorClass::Transient
        }
        sqlx::Error::Database(_) => ErrorClass::Permanent,
        sqlx::Error::RowNotFound => ErrorClass::Permanent,
        other => {
            let msg = other.to_string().to_lowercase();
            if msg.contains("connection closed")
                || msg.contains("connection reset")
                || msg.contains("ssl")
                || msg.contains("eof")
                || msg.contains("operational")
                || msg.contains("broken pipe")
            {
                ErrorClass::Transient
            } else {
                ErrorClass::Permanent
            }
        }
    }
}

/// Run `f` up to `MAX_ATTEMPTS` times, retrying only transient
/// failures with exponential backoff (0.5s/1.0s/2.0s). Each retry
/// implicitly invalidates the failed connection by simply not reusing
/// it — the pool hands out a fresh one on the next call.
pub async fn retry_db<T, F, Fut>(mut f: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let class = classify(&err);
                attempt += 1;
                if class == ErrorClass::Permanent || attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
                let delay = BACKOFF_MS[(attempt - 1) as usize];
                tracing::warn!(
                    attempt,
                    delay_ms = delay,
                    error = %err,
                    "transient database error, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, sqlx::Error> = retry_db(|| {
            let calls = calls2.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, sqlx::Error> = retry_db(|| {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(sqlx::Error::RowNotFound)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, sqlx::Error> = retry_db(|| {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(sqlx::Error::PoolTimedOut)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
