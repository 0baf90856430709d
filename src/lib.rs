// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

#![recursion_limit = "1024"]

pub mod api;
pub mod client;
pub mod core;
pub mod storage;

pub use client::{ClientConfig, CollectionHandle, VectorClient};
pub use core::{DbConfig, DbError, DbResult};
