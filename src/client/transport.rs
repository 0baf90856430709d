// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Retry with exponential backoff for HTTP calls.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::core::error::DbError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Connection failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Server { status, .. } => *status >= 500,
            TransportError::Decode(_) => false,
        }
    }
}

impl From<TransportError> for DbError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Network(_) => DbError::Unavailable(e.to_string()),
            TransportError::Server { status, .. } if status >= 500 => {
                DbError::Unavailable(e.to_string())
            }
            TransportError::Server { status: 413, .. } => {
                DbError::Validation("request body exceeds the server limit".to_string())
            }
            TransportError::Server { .. } => DbError::Validation(e.to_string()),
            TransportError::Decode(_) => DbError::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached. Delays grow by `exponential_base` up to
/// `max_delay`, plus up to 30% jitter.
pub async fn retry_with_backoff<F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<R, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, TransportError>>,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempts >= config.max_attempts => return Err(e),
            Err(e) => {
                let jitter = Duration::from_millis(
                    (rand::random::<f64>() * delay.as_millis() as f64 * 0.3) as u64,
                );
                warn!("Attempt {} failed: {}; retrying in {:?}", attempts, e, delay + jitter);
                sleep(delay + jitter).await;

                let next_delay = Duration::from_millis(
                    (delay.as_millis() as f64 * config.exponential_base) as u64,
                );
                delay = next_delay.min(config.max_delay);
            }
        }
    }
}
