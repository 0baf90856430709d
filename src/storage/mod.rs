// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod backend;
pub mod memory;
pub mod object_store;

pub use backend::StorageBackend;
pub use memory::InMemoryBackend;
pub use object_store::{InMemoryObjectStore, ObjectStore, ObjectStoreError};
