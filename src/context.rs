//! 调用上下文：取消令牌与截止时间。
//!
//! Invocation context: a cancellation token with an optional deadline.
//!
//! A [`Context`] is handed to every work and fallback function. It is cheap to clone;
//! all clones observe the same cancellation. Derived contexts (`with_cancel`,
//! `with_timeout`, `with_deadline`) are cancelled when their parent is, and their
//! deadline never extends past the parent's.

use crate::Error;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// Explicitly cancelled through a [`CancelHandle`] or a parent context.
    Canceled,
    /// The deadline elapsed.
    DeadlineExceeded,
}

impl From<Cause> for Error {
    fn from(cause: Cause) -> Self {
        match cause {
            Cause::Canceled => Error::Cancelled,
            Cause::DeadlineExceeded => Error::DeadlineExceeded,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a child context plus the handle that cancels it.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let token = self.token.child_token();
        let handle = CancelHandle {
            token: token.clone(),
        };
        (
            Context {
                token,
                deadline: self.deadline,
            },
            handle,
        )
    }

    /// Derive a child context that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child context that expires at `deadline` (or the parent's, if earlier).
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        let (mut ctx, handle) = self.with_cancel();
        ctx.deadline = Some(match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        });
        (ctx, handle)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cause if the context is already finished, `None` while it is live.
    ///
    /// Explicit cancellation takes precedence over an expired deadline.
    pub fn cause(&self) -> Option<Cause> {
        if self.token.is_cancelled() {
            return Some(Cause::Canceled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(Cause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Same as [`Context::cause`], converted into the error a command resolves to.
    pub fn err(&self) -> Option<Error> {
        self.cause().map(Error::from)
    }

    pub fn is_done(&self) -> bool {
        self.cause().is_some()
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Cause {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Cause::Canceled,
                    _ = tokio::time::sleep_until(deadline) => Cause::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Cause::Canceled
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// Cancels the context it was created with (and every context derived from it).
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
