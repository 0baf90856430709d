// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Engine-side collection state
//!
//! A [`Collection`] owns its schema, index descriptors, partitions, load
//! state and entity store. Writes land in the store's pending log and are
//! promoted to the visible map once the visibility delay has elapsed or the
//! collection is flushed.

use crate::core::config::DbConfig;
use crate::core::error::{DbError, DbResult};
use crate::core::index::{IndexDescription, IndexDescriptor, IndexParams, IndexState};
use crate::core::partition::{self, Partition, DEFAULT_PARTITION};
use crate::core::schema::{CollectionOptions, CollectionSchema, ValidatedRow};
use crate::core::types::{Entity, LoadState, PrimaryKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Collection-level load state with compare-and-swap transitions.
#[derive(Debug)]
pub struct LoadStateCell(AtomicU8);

impl LoadStateCell {
    pub fn new(state: LoadState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn get(&self) -> LoadState {
        LoadState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: LoadState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Move from `from` to `to`; returns false if the state was not `from`.
    pub fn transition(&self, from: LoadState, to: LoadState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub entity: Entity,
    pub partition: String,
}

#[derive(Debug, Clone)]
enum PendingOp {
    Put(StoredEntity),
    Delete(PrimaryKey),
}

/// Entities keyed by primary key, with delayed visibility.
///
/// `latest` reflects every acknowledged write and drives duplicate checks,
/// counts and deletes. `visible` is what search, query and get observe.
#[derive(Debug)]
pub struct EntityStore {
    latest: BTreeMap<PrimaryKey, StoredEntity>,
    visible: BTreeMap<PrimaryKey, StoredEntity>,
    pending: VecDeque<(Instant, PendingOp)>,
    delay: Duration,
}

impl EntityStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            latest: BTreeMap::new(),
            visible: BTreeMap::new(),
            pending: VecDeque::new(),
            delay,
        }
    }

    pub fn contains(&self, pk: &PrimaryKey) -> bool {
        self.latest.contains_key(pk)
    }

    pub fn latest(&self) -> impl Iterator<Item = &StoredEntity> {
        self.latest.values()
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn put(&mut self, stored: StoredEntity) {
        self.latest.insert(stored.entity.pk.clone(), stored.clone());
        self.enqueue(PendingOp::Put(stored));
    }

    pub fn remove(&mut self, pk: &PrimaryKey) -> bool {
        if self.latest.remove(pk).is_none() {
            return false;
        }
        self.enqueue(PendingOp::Delete(pk.clone()));
        true
    }

    fn enqueue(&mut self, op: PendingOp) {
        if self.delay.is_zero() && self.pending.is_empty() {
            Self::apply(&mut self.visible, op);
        } else {
            self.pending.push_back((Instant::now(), op));
        }
    }

    fn apply(visible: &mut BTreeMap<PrimaryKey, StoredEntity>, op: PendingOp) {
        match op {
            PendingOp::Put(stored) => {
                visible.insert(stored.entity.pk.clone(), stored);
            }
            PendingOp::Delete(pk) => {
                visible.remove(&pk);
            }
        }
    }

    /// Whether `promote(now)` would make anything readable.
    pub fn has_due(&self, now: Instant) -> bool {
        self.pending
            .front()
            .map_or(false, |(at, _)| now.duration_since(*at) >= self.delay)
    }

    /// Make writes older than the visibility delay readable.
    pub fn promote(&mut self, now: Instant) {
        while let Some((at, _)) = self.pending.front() {
            if now.duration_since(*at) < self.delay {
                break;
            }
            if let Some((_, op)) = self.pending.pop_front() {
                Self::apply(&mut self.visible, op);
            }
        }
    }

    /// Make every acknowledged write readable.
    pub fn flush(&mut self) -> usize {
        let count = self.pending.len();
        while let Some((_, op)) = self.pending.pop_front() {
            Self::apply(&mut self.visible, op);
        }
        count
    }

    pub fn visible(&self) -> impl Iterator<Item = &StoredEntity> {
        self.visible.values()
    }

    pub fn get_visible(&self, pk: &PrimaryKey) -> Option<&StoredEntity> {
        self.visible.get(pk)
    }

    /// Remove every entity stored in `partition`, pending or not.
    pub fn purge_partition(&mut self, partition: &str) -> usize {
        let before = self.latest.len();
        self.latest.retain(|_, s| s.partition != partition);
        self.visible.retain(|_, s| s.partition != partition);
        self.pending.retain(|(_, op)| match op {
            PendingOp::Put(stored) => stored.partition != partition,
            PendingOp::Delete(_) => true,
        });
        before - self.latest.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDescription {
    pub collection_name: String,
    pub collection_id: i64,
    pub schema: CollectionSchema,
    pub aliases: Vec<String>,
    pub partitions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_partitions: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub row_count: usize,
    pub load_state: LoadState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDescription {
    pub alias: String,
    pub collection_name: String,
}

#[derive(Debug)]
pub struct Collection {
    pub name: String,
    pub id: i64,
    pub schema: CollectionSchema,
    pub created_at: DateTime<Utc>,
    indexes: Vec<IndexDescriptor>,
    partitions: Vec<Partition>,
    num_partitions: Option<usize>,
    load_state: LoadStateCell,
    pub store: EntityStore,
    next_auto_id: i64,
}

impl Collection {
    pub fn new(
        id: i64,
        name: &str,
        schema: CollectionSchema,
        options: &CollectionOptions,
        config: &DbConfig,
    ) -> DbResult<Self> {
        schema.validate()?;
        if schema.vector_fields().next().is_none() {
            return Err(DbError::Schema(format!(
                "collection '{}': schema must declare at least one vector field",
                name
            )));
        }

        let num_partitions = schema
            .partition_key_field()
            .map(|_| options.num_partitions.unwrap_or(config.default_num_partitions).max(1));
        let partitions = match num_partitions {
            Some(n) => (0..n).map(|i| Partition::new(partition::hidden_partition_name(i))).collect(),
            None => vec![Partition::new(DEFAULT_PARTITION)],
        };

        let created_at = Utc::now();
        Ok(Self {
            name: name.to_string(),
            id,
            schema,
            created_at,
            indexes: Vec::new(),
            partitions,
            num_partitions,
            load_state: LoadStateCell::new(LoadState::NotLoad),
            store: EntityStore::new(config.visibility_delay),
            next_auto_id: created_at.timestamp_millis() << 18,
        })
    }

    pub fn has_partition_key(&self) -> bool {
        self.num_partitions.is_some()
    }

    pub fn num_partitions(&self) -> Option<usize> {
        self.num_partitions
    }

    pub fn allocate_id(&mut self) -> i64 {
        self.next_auto_id += 1;
        self.next_auto_id
    }

    // ---- partitions ----

    fn refuse_manual_partitions(&self, op: &str) -> DbResult<()> {
        if self.has_partition_key() {
            return Err(DbError::Validation(format!(
                "collection '{}': cannot {} when a partition key is declared",
                self.name, op
            )));
        }
        Ok(())
    }

    fn partition(&self, name: &str) -> DbResult<&Partition> {
        self.partitions.iter().find(|p| p.name == name).ok_or_else(|| {
            DbError::NotFound(format!(
                "partition '{}' does not exist in collection '{}'",
                name, self.name
            ))
        })
    }

    pub fn has_partition(&self, name: &str) -> bool {
        self.partitions.iter().any(|p| p.name == name)
    }

    pub fn partition_names(&self) -> Vec<String> {
        self.partitions.iter().map(|p| p.name.clone()).collect()
    }

    pub fn create_partition(&mut self, name: &str) -> DbResult<()> {
        self.refuse_manual_partitions("create partitions")?;
        if name.is_empty() {
            return Err(DbError::Validation("partition name must not be empty".to_string()));
        }
        if self.has_partition(name) {
            return Err(DbError::AlreadyExists(format!(
                "partition '{}' already exists in collection '{}'",
                name, self.name
            )));
        }
        self.partitions.push(Partition::new(name));
        Ok(())
    }

    pub fn drop_partition(&mut self, name: &str) -> DbResult<()> {
        self.refuse_manual_partitions("drop partitions")?;
        if name == DEFAULT_PARTITION {
            return Err(DbError::Validation(format!(
                "collection '{}': the default partition cannot be dropped",
                self.name
            )));
        }
        if self.partition(name)?.loaded {
            return Err(DbError::InvalidState(format!(
                "partition '{}' is loaded; release it before dropping",
                name
            )));
        }
        self.partitions.retain(|p| p.name != name);
        let purged = self.store.purge_partition(name);
        debug!("Dropped partition {} of {} ({} entities)", name, self.name, purged);
        Ok(())
    }

    // ---- indexes ----

    pub fn create_index(&mut self, params: &IndexParams) -> DbResult<()> {
        params.validate(&self.schema)?;
        for descriptor in &params.indexes {
            if let Some(existing) = self
                .indexes
                .iter()
                .find(|d| d.index_name == descriptor.index_name && d.field_name != descriptor.field_name)
            {
                return Err(DbError::AlreadyExists(format!(
                    "index name '{}' is already used for field '{}'",
                    existing.index_name, existing.field_name
                )));
            }
            if self.load_state() != LoadState::NotLoad
                && self.indexes.iter().any(|d| d.field_name == descriptor.field_name)
            {
                return Err(DbError::InvalidState(format!(
                    "collection '{}' is loaded; release it before replacing the index on '{}'",
                    self.name, descriptor.field_name
                )));
            }
        }
        for descriptor in &params.indexes {
            self.indexes.retain(|d| d.field_name != descriptor.field_name);
            self.indexes.push(descriptor.clone());
        }
        Ok(())
    }

    /// Look an index up by index name, falling back to its field name.
    fn find_index(&self, name: &str) -> DbResult<&IndexDescriptor> {
        self.indexes
            .iter()
            .find(|d| d.index_name == name)
            .or_else(|| self.indexes.iter().find(|d| d.field_name == name))
            .ok_or_else(|| {
                DbError::NotFound(format!(
                    "index '{}' does not exist in collection '{}'",
                    name, self.name
                ))
            })
    }

    pub fn index_for_field(&self, field: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|d| d.field_name == field)
    }

    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.iter().map(|d| d.index_name.clone()).collect()
    }

    pub fn describe_index(&self, name: &str) -> DbResult<IndexDescription> {
        let descriptor = self.find_index(name)?.clone();
        let total_rows = self.store.len();
        Ok(IndexDescription {
            descriptor,
            state: IndexState::Finished,
            total_rows,
            indexed_rows: total_rows,
            pending_index_rows: 0,
        })
    }

    pub fn drop_index(&mut self, name: &str) -> DbResult<()> {
        let index_name = self.find_index(name)?.index_name.clone();
        if self.load_state() != LoadState::NotLoad {
            return Err(DbError::InvalidState(format!(
                "collection '{}' is loaded; release it before dropping index '{}'",
                self.name, index_name
            )));
        }
        self.indexes.retain(|d| d.index_name != index_name);
        Ok(())
    }

    // ---- load state ----

    pub fn load_state(&self) -> LoadState {
        self.load_state.get()
    }

    pub fn partition_load_state(&self, name: &str) -> DbResult<LoadState> {
        Ok(if self.partition(name)?.loaded {
            LoadState::Loaded
        } else {
            LoadState::NotLoad
        })
    }

    /// Load the whole collection (`None`) or the named partitions.
    pub fn load(&mut self, partitions: Option<&[String]>) -> DbResult<()> {
        for field in self.schema.vector_fields() {
            if self.index_for_field(&field.name).is_none() {
                return Err(DbError::MissingIndex(format!(
                    "collection '{}': vector field '{}' has no index",
                    self.name, field.name
                )));
            }
        }
        if let Some(names) = partitions {
            for name in names {
                self.partition(name)?;
            }
        }

        // a concurrent loader may already have moved us to Loading
        self.load_state.transition(LoadState::NotLoad, LoadState::Loading);
        for p in self.partitions.iter_mut() {
            if partitions.map_or(true, |names| names.contains(&p.name)) {
                p.loaded = true;
            }
        }
        self.load_state.set(LoadState::Loaded);
        Ok(())
    }

    /// Release the whole collection (`None`) or the named partitions.
    /// Releasing something that is not loaded is a no-op.
    pub fn release(&mut self, partitions: Option<&[String]>) -> DbResult<()> {
        if let Some(names) = partitions {
            for name in names {
                self.partition(name)?;
            }
        }
        for p in self.partitions.iter_mut() {
            if partitions.map_or(true, |names| names.contains(&p.name)) {
                p.loaded = false;
            }
        }
        if !self.partitions.iter().any(|p| p.loaded) {
            self.load_state.set(LoadState::NotLoad);
        }
        Ok(())
    }

    /// Percentage of partitions loaded.
    pub fn loading_progress(&self) -> u32 {
        if self.partitions.is_empty() {
            return 0;
        }
        let loaded = self.partitions.iter().filter(|p| p.loaded).count();
        (loaded * 100 / self.partitions.len()) as u32
    }

    /// Partitions a read may touch: the named ones (each must be loaded), or
    /// every loaded partition.
    pub fn readable_partitions(&self, names: &[String]) -> DbResult<HashSet<String>> {
        if names.is_empty() {
            if self.load_state() == LoadState::NotLoad {
                return Err(DbError::NotLoaded(format!(
                    "collection '{}' is not loaded",
                    self.name
                )));
            }
            return Ok(self
                .partitions
                .iter()
                .filter(|p| p.loaded)
                .map(|p| p.name.clone())
                .collect());
        }
        let mut out = HashSet::new();
        for name in names {
            if !self.partition(name)?.loaded {
                return Err(DbError::NotLoaded(format!(
                    "partition '{}' of collection '{}' is not loaded",
                    name, self.name
                )));
            }
            out.insert(name.clone());
        }
        Ok(out)
    }

    /// Partition a validated row is written to.
    pub fn write_partition(&self, explicit: Option<&str>, row: &ValidatedRow) -> DbResult<String> {
        if let (Some(n), Some(key_field)) = (self.num_partitions, self.schema.partition_key_field()) {
            if explicit.is_some() {
                return Err(DbError::Validation(format!(
                    "collection '{}' routes by partition key '{}'; a partition name is not allowed",
                    self.name, key_field.name
                )));
            }
            let index = row
                .scalars
                .get(&key_field.name)
                .map(|value| partition::route_value(value, n))
                .unwrap_or(0);
            return Ok(partition::hidden_partition_name(index));
        }
        match explicit {
            Some(name) => self.partition(name).map(|p| p.name.clone()),
            None => Ok(DEFAULT_PARTITION.to_string()),
        }
    }

    pub fn describe(&self, aliases: Vec<String>) -> CollectionDescription {
        CollectionDescription {
            collection_name: self.name.clone(),
            collection_id: self.id,
            schema: self.schema.clone(),
            aliases,
            partitions: self.partition_names(),
            num_partitions: self.num_partitions,
            created_at: self.created_at,
            row_count: self.store.len(),
            load_state: self.load_state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::{IndexType, MetricType};
    use crate::core::schema::{DataType, FieldOptions, SchemaBuilder};
    use serde_json::json;

    fn collection() -> Collection {
        let schema = CollectionSchema::quick(2).unwrap();
        Collection::new(1, "demo", schema, &CollectionOptions::default(), &DbConfig::immediate())
            .unwrap()
    }

    fn vector_index() -> IndexParams {
        IndexParams::new().add_index("vector", IndexType::AutoIndex, Some(MetricType::L2), None)
    }

    fn stored(pk: i64, partition: &str) -> StoredEntity {
        let mut entity = Entity {
            pk: PrimaryKey::Int(pk),
            scalars: BTreeMap::new(),
            vectors: BTreeMap::new(),
            dynamic: BTreeMap::new(),
        };
        entity.scalars.insert("id".to_string(), json!(pk));
        StoredEntity {
            entity,
            partition: partition.to_string(),
        }
    }

    #[test]
    fn test_load_requires_vector_index() {
        let mut c = collection();
        assert!(matches!(c.load(None), Err(DbError::MissingIndex(_))));
        c.create_index(&vector_index()).unwrap();
        c.load(None).unwrap();
        assert_eq!(c.load_state(), LoadState::Loaded);
        assert_eq!(c.loading_progress(), 100);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut c = collection();
        c.create_index(&vector_index()).unwrap();
        c.release(None).unwrap();
        c.load(None).unwrap();
        c.release(None).unwrap();
        c.release(None).unwrap();
        assert_eq!(c.load_state(), LoadState::NotLoad);
    }

    #[test]
    fn test_partition_load_drives_collection_state() {
        let mut c = collection();
        c.create_index(&vector_index()).unwrap();
        c.create_partition("p1").unwrap();
        c.load(Some(&["p1".to_string()])).unwrap();
        assert_eq!(c.load_state(), LoadState::Loaded);
        assert_eq!(c.loading_progress(), 50);
        assert!(matches!(c.drop_partition("p1"), Err(DbError::InvalidState(_))));
        c.release(Some(&["p1".to_string()])).unwrap();
        assert_eq!(c.load_state(), LoadState::NotLoad);
        c.drop_partition("p1").unwrap();
        assert!(!c.has_partition("p1"));
    }

    #[test]
    fn test_default_partition_cannot_be_dropped() {
        let mut c = collection();
        assert!(matches!(c.drop_partition(DEFAULT_PARTITION), Err(DbError::Validation(_))));
        assert!(matches!(c.drop_partition("nope"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_drop_index_requires_release() {
        let mut c = collection();
        c.create_index(&vector_index()).unwrap();
        c.load(None).unwrap();
        assert!(matches!(c.drop_index("vector"), Err(DbError::InvalidState(_))));
        c.release(None).unwrap();
        c.drop_index("vector").unwrap();
        assert!(c.list_indexes().is_empty());
    }

    #[test]
    fn test_partition_key_collection_has_hidden_partitions() {
        let schema = SchemaBuilder::new()
            .add_field("id", DataType::Int64, FieldOptions::new().primary())
            .unwrap()
            .add_field("tenant", DataType::VarChar, FieldOptions::new().max_length(32))
            .unwrap()
            .add_field("vector", DataType::FloatVector, FieldOptions::new().dim(2))
            .unwrap()
            .partition_key_field("tenant")
            .build()
            .unwrap();
        let options = CollectionOptions {
            num_partitions: Some(4),
            metric_type: None,
        };
        let mut c = Collection::new(2, "tenants", schema, &options, &DbConfig::immediate()).unwrap();
        assert_eq!(c.partition_names().len(), 4);
        assert!(matches!(c.create_partition("p"), Err(DbError::Validation(_))));
    }

    #[test]
    fn test_store_delays_visibility_until_flush() {
        let mut store = EntityStore::new(Duration::from_secs(60));
        store.put(stored(1, DEFAULT_PARTITION));
        assert!(store.contains(&PrimaryKey::Int(1)));
        assert_eq!(store.visible().count(), 0);
        store.promote(Instant::now());
        assert_eq!(store.visible().count(), 0);
        assert_eq!(store.flush(), 1);
        assert_eq!(store.visible().count(), 1);
        store.remove(&PrimaryKey::Int(1));
        assert!(store.get_visible(&PrimaryKey::Int(1)).is_some());
        store.flush();
        assert!(store.get_visible(&PrimaryKey::Int(1)).is_none());
    }

    #[test]
    fn test_has_due_tracks_oldest_pending_write() {
        let mut store = EntityStore::new(Duration::from_secs(60));
        assert!(!store.has_due(Instant::now()));
        store.put(stored(1, DEFAULT_PARTITION));
        assert!(!store.has_due(Instant::now()));
        let later = Instant::now() + Duration::from_secs(61);
        assert!(store.has_due(later));
        store.promote(later);
        assert!(!store.has_due(later));
        assert_eq!(store.visible().count(), 1);
    }

    #[test]
    fn test_load_state_cell_cas() {
        let cell = LoadStateCell::new(LoadState::NotLoad);
        assert!(cell.transition(LoadState::NotLoad, LoadState::Loading));
        assert!(!cell.transition(LoadState::NotLoad, LoadState::Loading));
        assert_eq!(cell.get(), LoadState::Loading);
    }
}
