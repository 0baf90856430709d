// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub uri: String,
    /// Bearer token; takes precedence over `user`/`password`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(with = "crate::core::config::duration_millis")]
    pub timeout: Duration,
    /// Attempts per request, including the first.
    pub max_retries: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:19530".to_string(),
            token: None,
            user: None,
            password: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl ClientConfig {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uri: std::env::var("VECTOR_DB_URI").unwrap_or(defaults.uri),
            token: std::env::var("VECTOR_DB_TOKEN").ok(),
            user: std::env::var("VECTOR_DB_USER").ok(),
            password: std::env::var("VECTOR_DB_PASSWORD").ok(),
            timeout: std::env::var("VECTOR_DB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("VECTOR_DB_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Value sent as `Authorization: Bearer ...`.
    pub fn bearer(&self) -> Option<String> {
        match (&self.token, &self.user, &self.password) {
            (Some(token), _, _) => Some(token.clone()),
            (None, Some(user), Some(password)) => Some(format!("{}:{}", user, password)),
            (None, Some(user), None) => Some(format!("{}:", user)),
            _ => None,
        }
    }
}
