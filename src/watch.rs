//! Long-poll watch loop.
//!
//! A watch turns the store's stateless conditional GET into a stream of change
//! notifications. Each iteration issues one conditional read carrying the last
//! version seen and a long-poll hint, so the store can hold the request until
//! the value changes. The loop is strictly sequential: one outstanding poll per
//! watch, and the callback runs inline before the next poll starts.
//!
//! # Failure handling
//!
//! | Poll result | Action |
//! |-------------|--------|
//! | new version | update `last_version`, invoke callback, reset backoff |
//! | same version | poll again immediately |
//! | per-request timeout | long poll elapsed, poll again without backoff |
//! | caller cancelled | return |
//! | any other error | log, sleep for the backoff, double it (capped) |
//!
//! Delivery is at-least-once per distinct version observed: the callback fires
//! once for every version that differs from the previous one.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::types::{FetchOutcome, Version};

/// A conditional read the watch loop can drive.
///
/// [`Client`](crate::Client) is the production implementation.
pub trait ConditionalFetch {
    /// Read `key`, sending `last_known` as the precondition when non-empty and
    /// `watch` as the long-poll hint.
    fn fetch(
        &self,
        key: &str,
        last_known: &Version,
        watch: Option<Duration>,
    ) -> impl Future<Output = Result<FetchOutcome>> + Send;
}

/// Cancellation context for a watch: a cancellation token plus an optional deadline.
///
/// Clones share the same token, so cancelling any clone stops every watch
/// running under it.
#[derive(Debug, Clone, Default)]
pub struct WatchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WatchContext {
    /// A context that ends only when cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// A context that also ends at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context that also ends `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context cancelled together with this one, but which can also be
    /// cancelled on its own. The deadline is inherited.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel the context
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves when the context is cancelled or the deadline passes
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Exponential backoff in whole seconds: 1, 2, 4, ... capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: u64,
    max: u64,
}

impl Backoff {
    /// Starting backoff
    pub const INITIAL_SECS: u64 = 1;

    /// New backoff with the given ceiling (at least one second)
    pub fn new(max_secs: u64) -> Self {
        let max = max_secs.max(Self::INITIAL_SECS);
        Self {
            current: Self::INITIAL_SECS,
            max,
        }
    }

    /// Current wait in seconds
    pub fn secs(&self) -> u64 {
        self.current
    }

    /// Current wait
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.current)
    }

    /// Double the wait, up to the ceiling
    pub fn grow(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    /// Back to the initial wait
    pub fn reset(&mut self) {
        self.current = Self::INITIAL_SECS;
    }
}

/// Per-invocation watch state.
#[derive(Debug, Clone)]
pub struct WatchSession {
    last_version: Version,
    backoff: Backoff,
}

impl WatchSession {
    /// Fresh session: no version seen, backoff at its initial value
    pub fn new(max_backoff_secs: u64) -> Self {
        Self {
            last_version: Version::empty(),
            backoff: Backoff::new(max_backoff_secs),
        }
    }

    /// Last version handed to the callback
    pub fn last_version(&self) -> &Version {
        &self.last_version
    }

    /// Current backoff
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Record `version`. Returns true, and remembers it, only if it differs
    /// from the last version seen.
    pub fn observe(&mut self, version: &Version) -> bool {
        if *version == self.last_version {
            return false;
        }
        self.last_version = version.clone();
        true
    }
}

/// Tunables for a watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Long-poll hint sent with every poll
    pub long_poll: Duration,
    /// Backoff ceiling in seconds
    pub max_backoff_secs: u64,
}

impl WatchSettings {
    /// Settings taken from a client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            long_poll: config.watch_timeout(),
            max_backoff_secs: config.max_backoff(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Watch `key` through `source` until `ctx` ends, calling `callback` with the
/// value of every newly observed version.
///
/// Never returns an error: failures are logged and retried. The only early exit
/// besides cancellation is an empty key, which can never succeed.
pub async fn watch<S, F>(
    source: &S,
    key: &str,
    settings: &WatchSettings,
    ctx: &WatchContext,
    mut callback: F,
) where
    S: ConditionalFetch,
    F: FnMut(Bytes),
{
    if key.is_empty() {
        error!("refusing to watch an empty key");
        return;
    }

    let mut session = WatchSession::new(settings.max_backoff_secs);
    info!(key, "starting watch");

    loop {
        if ctx.is_cancelled() {
            break;
        }

        let result = tokio::select! {
            biased;
            _ = ctx.cancelled() => break,
            result = source.fetch(key, session.last_version(), Some(settings.long_poll)) => result,
        };

        match result {
            Ok(outcome) => {
                session.backoff.reset();
                if session.observe(outcome.version()) {
                    debug!(key, version = %session.last_version(), "version changed");
                    callback(outcome.into_value());
                } else {
                    debug!(key, version = %outcome.version(), "version unchanged");
                }
            }
            Err(e) if ctx.is_cancelled() => {
                debug!(key, "poll ended by cancellation: {}", e);
                break;
            }
            Err(e) if e.is_timeout() => {
                debug!(key, "long poll timed out, polling again");
            }
            Err(e) => {
                let delay = session.backoff().delay();
                error!(
                    key,
                    err = %e,
                    backoff_secs = session.backoff().secs(),
                    "failed to query kv store, backing off"
                );

                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = sleep(delay) => {}
                }

                session.backoff.grow();
            }
        }
    }

    info!(key, "watch cancelled, stopping");
}
