use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One-way stop signal shared by everything taking part in a run.
///
/// Once triggered it never reverts, and the first reason given is the one
/// that sticks. Child tokens are triggered together with their parent but
/// cancelling a child leaves the parent alone.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    token: CancellationToken,
    reason: OnceLock<String>,
    parent: Option<Arc<Inner>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.trigger(None);
    }

    pub fn cancel_with(&self, reason: impl Into<String>) {
        self.inner.trigger(Some(reason.into()));
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<&str> {
        self.inner.reason()
    }

    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// A token that is cancelled whenever `self` is.
    pub fn child(&self) -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                reason: OnceLock::new(),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    /// Trigger this token once `after` has elapsed.
    ///
    /// The timer runs as its own task on the current Tokio runtime; aborting
    /// the returned handle disarms it.
    pub fn cancel_after(&self, after: Duration) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel_with(format!("deadline of {} ms elapsed", after.as_millis()));
        })
    }
}

impl Inner {
    // The reason is stored before the flag flips, so an observer that sees
    // the token cancelled also sees why.
    fn trigger(&self, reason: Option<String>) {
        if self.token.is_cancelled() {
            return;
        }
        if let Some(reason) = reason {
            let _ = self.reason.set(reason);
        }
        self.token.cancel();
    }

    /// Own reason first; a child cancelled through its parent reports the
    /// parent's.
    fn reason(&self) -> Option<&str> {
        if let Some(reason) = self.reason.get() {
            return Some(reason.as_str());
        }
        match &self.parent {
            Some(parent) if parent.token.is_cancelled() => parent.reason(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
