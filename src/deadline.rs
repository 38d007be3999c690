//! Caller-supplied cancellation scope.
//!
//! Every network call and browser wait in the crate runs under a [`Deadline`].
//! Dropping the raced future on cancellation releases whatever it held, so a
//! cancelled panel fetch closes its connection and a cancelled render drops
//! its tab guard.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A cancellation token plus an optional point in time after which work is
/// abandoned.
#[derive(Debug, Clone)]
pub struct Deadline {
    token: CancellationToken,
    at: Option<(Instant, Duration)>,
}

impl Deadline {
    /// A scope that is only ever cancelled explicitly
    pub fn never() -> Self {
        Self {
            token: CancellationToken::new(),
            at: None,
        }
    }

    /// A scope bound to an existing token
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token, at: None }
    }

    /// Elapse `timeout` from now. Keeps an earlier deadline if one is already set.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        match self.at {
            Some((existing, _)) if existing <= at => {}
            _ => self.at = Some((at, timeout)),
        }
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drive `fut` to completion unless the scope is cancelled or the
    /// deadline elapses first. Cancellation wins ties.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            timeout = elapsed(self.at) => Err(Error::Timeout(timeout.as_millis() as u64)),
            res = fut => res,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::never()
    }
}

async fn elapsed(at: Option<(Instant, Duration)>) -> Duration {
    match at {
        Some((at, timeout)) => {
            tokio::time::sleep_until(at).await;
            timeout
        }
        None => std::future::pending().await,
    }
}
