//! Caller-supplied cancellation and deadline
//!
//! Every capability call receives a `RequestContext`. The core never adds a
//! timeout of its own; it only propagates the one the caller chose.

use crate::error::{AppResult, ExternalError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    deadline: Option<Instant>,
    cancelled: watch::Receiver<bool>,
}

/// Cancels every context cloned from the one it was created with
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        let (_sender, cancelled) = watch::channel(false);
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            deadline: None,
            cancelled,
        }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (sender, cancelled) = watch::channel(false);
        let ctx = Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            deadline: None,
            cancelled,
        };
        (ctx, CancelHandle { sender })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        // A child deadline can only tighten the parent's
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Fail fast if the caller has already given up
    pub fn check(&self) -> AppResult<()> {
        if self.is_cancelled() {
            return Err(ExternalError::Cancelled.into());
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ExternalError::DeadlineExceeded.into());
            }
        }
        Ok(())
    }

    /// Drive `fut` until it completes, the caller cancels, or the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        self.check()?;
        let cancelled = wait_cancelled(self.cancelled.clone());
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = cancelled => Err(ExternalError::Cancelled.into()),
            _ = deadline => Err(ExternalError::DeadlineExceeded.into()),
        }
    }
}

async fn wait_cancelled(mut receiver: watch::Receiver<bool>) {
    loop {
        if *receiver.borrow_and_update() {
            return;
        }
        if receiver.changed().await.is_err() {
            // Sender dropped without cancelling; nothing can cancel us now
            if *receiver.borrow() {
                return;
            }
            std::future::pending::<()>().await;
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppErrorKind;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = RequestContext::background();
        let value = ctx.run(async { Ok::<_, crate::error::AppError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_call() {
        let (ctx, handle) = RequestContext::with_cancel();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.run(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, crate::error::AppError>(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind, AppErrorKind::External(ExternalError::Cancelled));
        assert!(ctx.check().is_err());
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(10));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, crate::error::AppError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, AppErrorKind::External(ExternalError::DeadlineExceeded));
    }
}
