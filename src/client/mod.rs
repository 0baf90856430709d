// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

#[allow(clippy::module_inception)]
pub mod client;
pub mod collection;
pub mod config;
pub mod http;
pub mod iterator;
pub mod transport;

pub use client::VectorClient;
pub use collection::CollectionHandle;
pub use config::ClientConfig;
pub use http::HttpBackend;
pub use iterator::{QueryIterator, SearchIterator};
pub use transport::{RetryConfig, TransportError};
