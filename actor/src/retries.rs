// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Retries
//!
//! Backoff strategies for outbound delivery and the per-destination attempt counter used by
//! `ActorRef` when a remote tell or ask fails.
//!

use backoff::backoff::Backoff as InnerBackoff;

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// Trait to define a retry strategy. You can implement this trait to define your custom retry
/// strategy.
pub trait RetryStrategy: Debug + Send + Sync {
    /// Maximum number of tries before giving up.
    fn max_retries(&self) -> usize;

    /// Wait before the next try. `None` means retry immediately.
    fn next_backoff(&mut self) -> Option<Duration>;
}

/// Retries without waiting.
#[derive(Debug, Default)]
pub struct NoIntervalStrategy {
    max_retries: usize,
}

impl NoIntervalStrategy {
    pub fn new(max_retries: usize) -> Self {
        NoIntervalStrategy { max_retries }
    }
}

impl RetryStrategy for NoIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }
}

/// Waits the same interval between every try.
#[derive(Debug, Default)]
pub struct FixedIntervalStrategy {
    max_retries: usize,
    duration: Duration,
}

impl FixedIntervalStrategy {
    pub fn new(max_retries: usize, duration: Duration) -> Self {
        FixedIntervalStrategy {
            max_retries,
            duration,
        }
    }
}

impl RetryStrategy for FixedIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.duration)
    }
}

/// Waits `attempt × base` before try `attempt + 1`.
#[derive(Debug, Default)]
pub struct LinearIntervalStrategy {
    max_retries: usize,
    base: Duration,
    attempt: u32,
}

impl LinearIntervalStrategy {
    pub fn new(max_retries: usize, base: Duration) -> Self {
        LinearIntervalStrategy {
            max_retries,
            base,
            attempt: 0,
        }
    }
}

impl RetryStrategy for LinearIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        Some(self.base.saturating_mul(self.attempt))
    }
}

/// Exponential backoff with jitter.
#[derive(Debug, Default)]
pub struct ExponentialBackoffStrategy {
    max_retries: usize,
    inner: Arc<Mutex<backoff::ExponentialBackoff>>,
}

impl ExponentialBackoffStrategy {
    pub fn new(max_retries: usize) -> Self {
        ExponentialBackoffStrategy {
            max_retries,
            inner: Arc::new(Mutex::new(backoff::ExponentialBackoff::default())),
        }
    }

    pub fn with_initial_interval(max_retries: usize, initial: Duration) -> Self {
        let inner = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(initial)
            .with_max_elapsed_time(None)
            .build();
        ExponentialBackoffStrategy {
            max_retries,
            inner: Arc::new(Mutex::new(inner)),
        }
    }
}

impl RetryStrategy for ExponentialBackoffStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.inner.lock().ok().and_then(|mut eb| eb.next_backoff())
    }
}

/// Consecutive failure counter keyed by destination and payload
/// (`locator | message type | payload | action`).
#[derive(Debug, Default)]
pub(crate) struct RetryTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub(crate) fn key(
        locator: &str,
        message_type: &str,
        payload: &str,
        action: &str,
    ) -> String {
        format!("{}|{}|{}|{}", locator, message_type, payload, action)
    }

    /// Records a failure and returns the number of consecutive failures for `key`.
    pub(crate) fn record_failure(&self, key: &str) -> u32 {
        let mut attempts =
            self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = attempts.entry(key.to_owned()).or_insert(0);
        *count += 1;
        *count
    }

    pub(crate) fn clear(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    #[cfg(test)]
    pub(crate) fn attempts(&self, key: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or_default()
    }
}
