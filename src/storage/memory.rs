// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! In-memory engine implementing [`StorageBackend`]
//!
//! The catalog and each collection sit behind their own `tokio` RwLock, so
//! requests against different collections do not contend. A backend value
//! is a session: it shares the engine with every other session and carries
//! the principal that RBAC checks are made against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::core::collection::{AliasDescription, Collection, CollectionDescription};
use crate::core::config::DbConfig;
use crate::core::error::{DbError, DbResult};
use crate::core::filter::Filter;
use crate::core::import::{self, ImportJob, ImportState};
use crate::core::index::{IndexDescription, IndexParams};
use crate::core::mutation::{self, DeleteSelector};
use crate::core::query::{self, parse_options};
use crate::core::rbac::{
    Grant, ObjectType, Privilege, RbacStore, RoleDescription, UserDescription, ROOT_USER,
};
use crate::core::request::{
    CreateCollectionRequest, DeleteRequest, GetRequest, ImportRequest, InsertRequest,
    QueryRequest, SearchRequest,
};
use crate::core::search;
use crate::core::types::{DeleteResult, Hit, LoadState, MutationResult, Row};
use crate::storage::backend::StorageBackend;
use crate::storage::object_store::{InMemoryObjectStore, ObjectStore};

type CollectionHandle = Arc<RwLock<Collection>>;

#[derive(Default)]
struct Catalog {
    collections: HashMap<String, CollectionHandle>,
    /// alias -> collection name
    aliases: HashMap<String, String>,
}

impl Catalog {
    fn resolve(&self, name: &str) -> DbResult<(String, CollectionHandle)> {
        let real = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.collections
            .get(real)
            .map(|handle| (real.to_string(), Arc::clone(handle)))
            .ok_or_else(|| DbError::unknown_collection(name))
    }

    fn aliases_of(&self, collection: &str) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == collection)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }

    fn name_taken(&self, name: &str) -> bool {
        self.collections.contains_key(name) || self.aliases.contains_key(name)
    }
}

struct Engine {
    config: DbConfig,
    catalog: RwLock<Catalog>,
    rbac: RwLock<RbacStore>,
    imports: RwLock<BTreeMap<String, ImportJob>>,
    object_store: Arc<dyn ObjectStore>,
    next_collection_id: AtomicI64,
}

/// Names of collections, partitions, aliases, users and roles.
fn validate_name(kind: &str, name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let valid_start = chars.next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || name.len() > 255 {
        return Err(DbError::Validation(format!(
            "invalid {} name '{}': use letters, digits and underscores, starting with a letter or underscore",
            kind, name
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct InMemoryBackend {
    engine: Arc<Engine>,
    principal: String,
}

impl InMemoryBackend {
    pub fn new(config: DbConfig) -> Self {
        Self::with_object_store(config, Arc::new(InMemoryObjectStore::new()))
    }

    pub fn with_object_store(config: DbConfig, object_store: Arc<dyn ObjectStore>) -> Self {
        let rbac = RbacStore::new(&config.root_password);
        let engine = Engine {
            config,
            catalog: RwLock::new(Catalog::default()),
            rbac: RwLock::new(rbac),
            imports: RwLock::new(BTreeMap::new()),
            object_store,
            next_collection_id: AtomicI64::new(Utc::now().timestamp_millis() << 8),
        };
        Self {
            engine: Arc::new(engine),
            principal: ROOT_USER.to_string(),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.engine.config
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.engine.object_store)
    }

    /// Open a session for `user`. Credentials are only checked when
    /// authorization is enabled.
    pub async fn authenticate(&self, user: &str, password: &str) -> DbResult<InMemoryBackend> {
        if self.engine.config.authorization_enabled {
            self.engine.rbac.read().await.authenticate(user, password)?;
            debug!("Authenticated user {}", user);
            return Ok(Self {
                engine: Arc::clone(&self.engine),
                principal: user.to_string(),
            });
        }
        Ok(self.clone())
    }

    async fn authorize(&self, object_type: ObjectType, name: &str, privilege: Privilege) -> DbResult<()> {
        if !self.engine.config.authorization_enabled {
            return Ok(());
        }
        let result = self
            .engine
            .rbac
            .read()
            .await
            .check(&self.principal, object_type, name, privilege);
        if let Err(ref e) = result {
            warn!("Rejected request: {}", e);
        }
        result
    }

    async fn collection(&self, name: &str, privilege: Privilege) -> DbResult<CollectionHandle> {
        let (real, handle) = self.engine.catalog.read().await.resolve(name)?;
        self.authorize(ObjectType::Collection, &real, privilege).await?;
        Ok(handle)
    }

    async fn read<R, F>(&self, name: &str, privilege: Privilege, f: F) -> DbResult<R>
    where
        F: FnOnce(&Collection) -> DbResult<R> + Send,
        R: Send,
    {
        let handle = self.collection(name, privilege).await?;
        let guard = handle.read().await;
        f(&guard)
    }

    /// Like `read`, but first promotes writes whose visibility delay has
    /// elapsed. The write lock is only taken when something is due.
    async fn read_visible<R, F>(&self, name: &str, privilege: Privilege, f: F) -> DbResult<R>
    where
        F: FnOnce(&Collection) -> DbResult<R> + Send,
        R: Send,
    {
        let handle = self.collection(name, privilege).await?;
        {
            let guard = handle.read().await;
            if !guard.store.has_due(Instant::now()) {
                return f(&guard);
            }
        }
        let mut guard = handle.write().await;
        guard.store.promote(Instant::now());
        let guard = guard.downgrade();
        f(&guard)
    }

    async fn write<R, F>(&self, name: &str, privilege: Privilege, f: F) -> DbResult<R>
    where
        F: FnOnce(&mut Collection) -> DbResult<R> + Send,
        R: Send,
    {
        let handle = self.collection(name, privilege).await?;
        let mut guard = handle.write().await;
        f(&mut guard)
    }

    async fn set_import_state(&self, job_id: &str, update: impl FnOnce(&mut ImportJob)) {
        if let Some(job) = self.engine.imports.write().await.get_mut(job_id) {
            update(job);
        }
    }

    async fn run_import(&self, job_id: String) {
        let job = match self.engine.imports.read().await.get(&job_id).cloned() {
            Some(job) => job,
            None => return,
        };
        self.set_import_state(&job_id, |j| j.state = ImportState::Importing).await;
        info!("Import job {} started for {}", job_id, job.collection_name);

        match self.execute_import(&job).await {
            Ok(count) => {
                self.set_import_state(&job_id, |j| {
                    j.state = ImportState::Completed;
                    j.progress = 100;
                    j.imported_rows = count;
                })
                .await;
                info!("Import job {} completed: {} rows", job_id, count);
            }
            Err(e) => {
                error!("Import job {} failed: {}", job_id, e);
                self.set_import_state(&job_id, |j| j.state = ImportState::Failed(e.to_string()))
                    .await;
            }
        }
    }

    async fn execute_import(&self, job: &ImportJob) -> DbResult<usize> {
        let total = job.files.len().max(1);
        let mut rows: Vec<Row> = Vec::new();
        for (i, file_set) in job.files.iter().enumerate() {
            let contents = try_join_all(file_set.iter().map(|key| async move {
                let bytes = self.engine.object_store.get(key).await?;
                Ok::<_, DbError>((key.clone(), bytes))
            }))
            .await?;
            rows.extend(import::decode_file_set(&contents)?);
            let progress = ((i + 1) * 90 / total) as u32;
            self.set_import_state(&job.job_id, |j| j.progress = progress).await;
        }

        let handle = self.engine.catalog.read().await.resolve(&job.collection_name)?.1;
        let mut collection = handle.write().await;
        let result = mutation::insert(&mut collection, &rows, job.partition_name.as_deref())?;
        Ok(result.insert_count)
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn create_collection(&self, request: CreateCollectionRequest) -> DbResult<()> {
        let name = request.collection_name.as_str();
        validate_name("collection", name)?;
        self.authorize(ObjectType::Global, name, Privilege::CreateCollection).await?;

        let mut catalog = self.engine.catalog.write().await;
        if catalog.name_taken(name) {
            return Err(DbError::AlreadyExists(format!(
                "collection or alias '{}' already exists",
                name
            )));
        }
        let id = self.engine.next_collection_id.fetch_add(1, Ordering::SeqCst);
        let mut collection =
            Collection::new(id, name, request.schema, &request.options, &self.engine.config)?;
        if let Some(params) = request.index_params.filter(|p| !p.is_empty()) {
            collection.create_index(&params)?;
            collection.load(None)?;
        }
        catalog
            .collections
            .insert(name.to_string(), Arc::new(RwLock::new(collection)));
        info!("Created collection {} (id {})", name, id);
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> DbResult<()> {
        let mut catalog = self.engine.catalog.write().await;
        let (real, _) = catalog.resolve(collection)?;
        self.authorize(ObjectType::Global, &real, Privilege::DropCollection).await?;
        catalog.collections.remove(&real);
        catalog.aliases.retain(|_, target| target != &real);
        info!("Dropped collection {}", real);
        Ok(())
    }

    async fn has_collection(&self, collection: &str) -> DbResult<bool> {
        self.authorize(ObjectType::Global, collection, Privilege::ShowCollections).await?;
        Ok(self.engine.catalog.read().await.resolve(collection).is_ok())
    }

    async fn list_collections(&self) -> DbResult<Vec<String>> {
        self.authorize(ObjectType::Global, "*", Privilege::ShowCollections).await?;
        let mut names: Vec<String> = self
            .engine
            .catalog
            .read()
            .await
            .collections
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn describe_collection(&self, collection: &str) -> DbResult<CollectionDescription> {
        let (real, handle) = self.engine.catalog.read().await.resolve(collection)?;
        self.authorize(ObjectType::Collection, &real, Privilege::DescribeCollection).await?;
        let aliases = self.engine.catalog.read().await.aliases_of(&real);
        let guard = handle.read().await;
        Ok(guard.describe(aliases))
    }

    async fn collection_id(&self, collection: &str) -> DbResult<i64> {
        let (real, handle) = self.engine.catalog.read().await.resolve(collection)?;
        self.authorize(ObjectType::Collection, &real, Privilege::DescribeCollection).await?;
        let id = handle.read().await.id;
        Ok(id)
    }

    async fn load_collection(&self, collection: &str) -> DbResult<()> {
        self.write(collection, Privilege::Load, |c| {
            c.load(None)?;
            info!("Loaded collection {}", c.name);
            Ok(())
        })
        .await
    }

    async fn release_collection(&self, collection: &str) -> DbResult<()> {
        self.write(collection, Privilege::Release, |c| {
            c.release(None)?;
            info!("Released collection {}", c.name);
            Ok(())
        })
        .await
    }

    async fn get_load_state(&self, collection: &str, partition: Option<&str>) -> DbResult<LoadState> {
        self.read(collection, Privilege::GetLoadState, |c| match partition {
            Some(p) => c.partition_load_state(p),
            None => Ok(c.load_state()),
        })
        .await
    }

    async fn loading_progress(&self, collection: &str) -> DbResult<u32> {
        self.read(collection, Privilege::GetLoadingProgress, |c| Ok(c.loading_progress()))
            .await
    }

    async fn flush(&self, collection: &str) -> DbResult<()> {
        self.write(collection, Privilege::Flush, |c| {
            let flushed = c.store.flush();
            debug!("Flushed {} pending writes in {}", flushed, c.name);
            Ok(())
        })
        .await
    }

    async fn create_partition(&self, collection: &str, partition: &str) -> DbResult<()> {
        validate_name("partition", partition)?;
        self.write(collection, Privilege::CreatePartition, |c| c.create_partition(partition))
            .await
    }

    async fn drop_partition(&self, collection: &str, partition: &str) -> DbResult<()> {
        self.write(collection, Privilege::DropPartition, |c| c.drop_partition(partition))
            .await
    }

    async fn has_partition(&self, collection: &str, partition: &str) -> DbResult<bool> {
        self.read(collection, Privilege::HasPartition, |c| Ok(c.has_partition(partition)))
            .await
    }

    async fn list_partitions(&self, collection: &str) -> DbResult<Vec<String>> {
        self.read(collection, Privilege::ShowPartitions, |c| Ok(c.partition_names()))
            .await
    }

    async fn load_partitions(&self, collection: &str, partitions: &[String]) -> DbResult<()> {
        self.write(collection, Privilege::Load, |c| c.load(Some(partitions)))
            .await
    }

    async fn release_partitions(&self, collection: &str, partitions: &[String]) -> DbResult<()> {
        self.write(collection, Privilege::Release, |c| c.release(Some(partitions)))
            .await
    }

    async fn create_index(&self, collection: &str, params: IndexParams) -> DbResult<()> {
        self.write(collection, Privilege::CreateIndex, |c| {
            c.create_index(&params)?;
            info!("Created {} index(es) on {}", params.indexes.len(), c.name);
            Ok(())
        })
        .await
    }

    async fn describe_index(&self, collection: &str, index: &str) -> DbResult<IndexDescription> {
        self.read(collection, Privilege::IndexDetail, |c| c.describe_index(index))
            .await
    }

    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<String>> {
        self.read(collection, Privilege::IndexDetail, |c| Ok(c.list_indexes()))
            .await
    }

    async fn drop_index(&self, collection: &str, index: &str) -> DbResult<()> {
        self.write(collection, Privilege::DropIndex, |c| c.drop_index(index))
            .await
    }

    async fn create_alias(&self, collection: &str, alias: &str) -> DbResult<()> {
        validate_name("alias", alias)?;
        self.authorize(ObjectType::Global, alias, Privilege::CreateAlias).await?;
        let mut catalog = self.engine.catalog.write().await;
        let (real, _) = catalog.resolve(collection)?;
        if catalog.name_taken(alias) {
            return Err(DbError::AlreadyExists(format!(
                "alias '{}' is already used by a collection or alias",
                alias
            )));
        }
        catalog.aliases.insert(alias.to_string(), real);
        Ok(())
    }

    async fn drop_alias(&self, alias: &str) -> DbResult<()> {
        self.authorize(ObjectType::Global, alias, Privilege::DropAlias).await?;
        let mut catalog = self.engine.catalog.write().await;
        catalog
            .aliases
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| DbError::NotFound(format!("alias '{}' does not exist", alias)))
    }

    async fn alter_alias(&self, collection: &str, alias: &str) -> DbResult<()> {
        self.authorize(ObjectType::Global, alias, Privilege::CreateAlias).await?;
        let mut catalog = self.engine.catalog.write().await;
        if !catalog.aliases.contains_key(alias) {
            return Err(DbError::NotFound(format!("alias '{}' does not exist", alias)));
        }
        let real = match catalog.collections.contains_key(collection) {
            true => collection.to_string(),
            false => return Err(DbError::unknown_collection(collection)),
        };
        catalog.aliases.insert(alias.to_string(), real);
        Ok(())
    }

    async fn describe_alias(&self, alias: &str) -> DbResult<AliasDescription> {
        self.authorize(ObjectType::Global, alias, Privilege::DescribeAlias).await?;
        let catalog = self.engine.catalog.read().await;
        catalog
            .aliases
            .get(alias)
            .map(|target| AliasDescription {
                alias: alias.to_string(),
                collection_name: target.clone(),
            })
            .ok_or_else(|| DbError::NotFound(format!("alias '{}' does not exist", alias)))
    }

    async fn list_aliases(&self, collection: &str) -> DbResult<Vec<String>> {
        self.authorize(ObjectType::Global, collection, Privilege::ListAliases).await?;
        let catalog = self.engine.catalog.read().await;
        let (real, _) = catalog.resolve(collection)?;
        Ok(catalog.aliases_of(&real))
    }

    async fn insert(&self, request: InsertRequest) -> DbResult<MutationResult> {
        let partition = request.partition_name.as_deref();
        self.write(&request.collection_name, Privilege::Insert, |c| {
            let result = mutation::insert(c, &request.data, partition)?;
            debug!("Inserted {} rows into {}", result.insert_count, c.name);
            Ok(result)
        })
        .await
    }

    async fn upsert(&self, request: InsertRequest) -> DbResult<MutationResult> {
        let partition = request.partition_name.as_deref();
        self.write(&request.collection_name, Privilege::Upsert, |c| {
            let result = mutation::upsert(c, &request.data, partition)?;
            debug!("Upserted {} rows into {}", result.insert_count, c.name);
            Ok(result)
        })
        .await
    }

    async fn delete(&self, request: DeleteRequest) -> DbResult<DeleteResult> {
        let config = &self.engine.config;
        let partition = request.partition_name.as_deref();
        self.write(&request.collection_name, Privilege::Delete, |c| {
            let selector = match (&request.ids, &request.filter) {
                (Some(ids), None) => DeleteSelector::Ids(ids.clone()),
                (None, Some(filter)) => {
                    DeleteSelector::Filter(Filter::compile(filter, &c.schema, parse_options(config))?)
                }
                _ => {
                    return Err(DbError::Validation(
                        "delete needs exactly one of ids or filter".to_string(),
                    ))
                }
            };
            let result = mutation::delete(c, &selector, partition)?;
            debug!("Deleted {} entities from {}", result.delete_count, c.name);
            Ok(result)
        })
        .await
    }

    async fn search(&self, request: SearchRequest) -> DbResult<Vec<Vec<Hit>>> {
        let config = &self.engine.config;
        self.read_visible(&request.collection_name, Privilege::Search, |c| {
            search::search(c, &request, config)
        })
        .await
    }

    async fn query(&self, request: QueryRequest) -> DbResult<Vec<Row>> {
        let config = &self.engine.config;
        self.read_visible(&request.collection_name, Privilege::Query, |c| {
            query::query(c, &request, config)
        })
        .await
    }

    async fn get(&self, request: GetRequest) -> DbResult<Vec<Row>> {
        self.read_visible(&request.collection_name, Privilege::Query, |c| query::get(c, &request))
            .await
    }

    async fn create_user(&self, user: &str, password: &str) -> DbResult<()> {
        validate_name("user", user)?;
        self.authorize(ObjectType::Global, "*", Privilege::CreateOwnership).await?;
        self.engine.rbac.write().await.create_user(user, password)
    }

    async fn drop_user(&self, user: &str) -> DbResult<()> {
        self.authorize(ObjectType::Global, "*", Privilege::DropOwnership).await?;
        self.engine.rbac.write().await.drop_user(user)
    }

    async fn update_password(&self, user: &str, old_password: &str, new_password: &str) -> DbResult<()> {
        if user != self.principal {
            self.authorize(ObjectType::User, user, Privilege::UpdateUser).await?;
        }
        self.engine
            .rbac
            .write()
            .await
            .update_password(user, old_password, new_password)
    }

    async fn list_users(&self) -> DbResult<Vec<String>> {
        self.authorize(ObjectType::User, "*", Privilege::SelectUser).await?;
        Ok(self.engine.rbac.read().await.list_users())
    }

    async fn describe_user(&self, user: &str) -> DbResult<UserDescription> {
        self.authorize(ObjectType::User, user, Privilege::SelectUser).await?;
        self.engine.rbac.read().await.describe_user(user)
    }

    async fn create_role(&self, role: &str) -> DbResult<()> {
        validate_name("role", role)?;
        self.authorize(ObjectType::Global, "*", Privilege::CreateOwnership).await?;
        self.engine.rbac.write().await.create_role(role)
    }

    async fn drop_role(&self, role: &str) -> DbResult<()> {
        self.authorize(ObjectType::Global, "*", Privilege::DropOwnership).await?;
        self.engine.rbac.write().await.drop_role(role)
    }

    async fn list_roles(&self) -> DbResult<Vec<String>> {
        self.authorize(ObjectType::Global, "*", Privilege::SelectOwnership).await?;
        Ok(self.engine.rbac.read().await.list_roles())
    }

    async fn describe_role(&self, role: &str) -> DbResult<RoleDescription> {
        self.authorize(ObjectType::Global, "*", Privilege::SelectOwnership).await?;
        self.engine.rbac.read().await.describe_role(role)
    }

    async fn grant_role(&self, user: &str, role: &str) -> DbResult<()> {
        self.authorize(ObjectType::Global, "*", Privilege::ManageOwnership).await?;
        self.engine.rbac.write().await.grant_role(user, role)
    }

    async fn revoke_role(&self, user: &str, role: &str) -> DbResult<()> {
        self.authorize(ObjectType::Global, "*", Privilege::ManageOwnership).await?;
        self.engine.rbac.write().await.revoke_role(user, role)
    }

    async fn grant_privilege(&self, role: &str, grant: Grant) -> DbResult<()> {
        self.authorize(ObjectType::Global, "*", Privilege::ManageOwnership).await?;
        self.engine.rbac.write().await.grant_privilege(role, grant)
    }

    async fn revoke_privilege(&self, role: &str, grant: Grant) -> DbResult<()> {
        self.authorize(ObjectType::Global, "*", Privilege::ManageOwnership).await?;
        self.engine.rbac.write().await.revoke_privilege(role, &grant)
    }

    async fn create_import_job(&self, request: ImportRequest) -> DbResult<String> {
        if request.files.is_empty() {
            return Err(DbError::Validation("import needs at least one file set".to_string()));
        }
        let handle = self.collection(&request.collection_name, Privilege::Import).await?;
        let collection_name = {
            let collection = handle.read().await;
            if let Some(partition) = &request.partition_name {
                if !collection.has_partition(partition) {
                    return Err(DbError::NotFound(format!(
                        "partition '{}' does not exist in collection '{}'",
                        partition, collection.name
                    )));
                }
            }
            collection.name.clone()
        };

        let job = ImportJob::new(&collection_name, request.partition_name, request.files);
        let job_id = job.job_id.clone();
        {
            let mut imports = self.engine.imports.write().await;
            imports.insert(job_id.clone(), job);
            prune_finished_jobs(&mut imports, self.engine.config.max_import_jobs);
        }

        let backend = self.clone();
        let spawned_id = job_id.clone();
        tokio::spawn(async move {
            backend.run_import(spawned_id).await;
        });
        info!("Queued import job {} for {}", job_id, request.collection_name);
        Ok(job_id)
    }

    async fn get_import_progress(&self, job_id: &str) -> DbResult<ImportJob> {
        let job = self
            .engine
            .imports
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("import job '{}' does not exist", job_id)))?;
        self.authorize(ObjectType::Collection, &job.collection_name, Privilege::Import)
            .await?;
        Ok(job)
    }

    /// Without a collection, only jobs on collections the caller may
    /// import into are listed.
    async fn list_import_jobs(&self, collection: Option<&str>) -> DbResult<Vec<ImportJob>> {
        let wanted = match collection {
            Some(name) => {
                let real = self
                    .engine
                    .catalog
                    .read()
                    .await
                    .resolve(name)
                    .map(|(real, _)| real)
                    .unwrap_or_else(|_| name.to_string());
                self.authorize(ObjectType::Collection, &real, Privilege::Import).await?;
                Some(real)
            }
            None => None,
        };

        let mut jobs: Vec<ImportJob> = self
            .engine
            .imports
            .read()
            .await
            .values()
            .filter(|job| wanted.as_ref().map_or(true, |name| &job.collection_name == name))
            .cloned()
            .collect();
        if wanted.is_none() && self.engine.config.authorization_enabled {
            let rbac = self.engine.rbac.read().await;
            jobs.retain(|job| {
                rbac.check(
                    &self.principal,
                    ObjectType::Collection,
                    &job.collection_name,
                    Privilege::Import,
                )
                .is_ok()
            });
        }
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}

/// Drop the oldest finished jobs until at most `cap` remain. Running jobs
/// are never dropped.
fn prune_finished_jobs(imports: &mut BTreeMap<String, ImportJob>, cap: usize) {
    if imports.len() <= cap {
        return;
    }
    let mut finished: Vec<(DateTime<Utc>, String)> = imports
        .values()
        .filter(|job| job.state.is_finished())
        .map(|job| (job.created_at, job.job_id.clone()))
        .collect();
    finished.sort();
    let excess = imports.len() - cap;
    for (_, job_id) in finished.into_iter().take(excess) {
        imports.remove(&job_id);
    }
    debug!("Import job table holds {} jobs", imports.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::{IndexType, MetricType};
    use crate::core::schema::{CollectionOptions, CollectionSchema};
    use serde_json::json;

    fn create_request(name: &str, indexed: bool) -> CreateCollectionRequest {
        CreateCollectionRequest {
            collection_name: name.to_string(),
            schema: CollectionSchema::quick(2).unwrap(),
            index_params: indexed.then(|| {
                IndexParams::new().add_index("vector", IndexType::AutoIndex, Some(MetricType::L2), None)
            }),
            options: CollectionOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_create_with_index_loads() {
        let backend = InMemoryBackend::new(DbConfig::immediate());
        backend.create_collection(create_request("demo", true)).await.unwrap();
        assert_eq!(backend.get_load_state("demo", None).await.unwrap(), LoadState::Loaded);

        backend.create_collection(create_request("bare", false)).await.unwrap();
        assert_eq!(backend.get_load_state("bare", None).await.unwrap(), LoadState::NotLoad);
        assert!(matches!(
            backend.create_collection(create_request("demo", false)).await,
            Err(DbError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_collection_name() {
        let backend = InMemoryBackend::new(DbConfig::immediate());
        assert!(matches!(
            backend.create_collection(create_request("9lives", false)).await,
            Err(DbError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_aliases_resolve_and_follow_drop() {
        let backend = InMemoryBackend::new(DbConfig::immediate());
        backend.create_collection(create_request("books", true)).await.unwrap();
        backend.create_alias("books", "library").await.unwrap();
        assert!(backend.has_collection("library").await.unwrap());
        assert!(matches!(
            backend.create_collection(create_request("library", false)).await,
            Err(DbError::AlreadyExists(_))
        ));

        let row = json!({"id": 1, "vector": [0.0, 1.0]}).as_object().unwrap().clone();
        backend.insert(InsertRequest::new("library", vec![row])).await.unwrap();
        let rows = backend.query(QueryRequest::new("books", "")).await.unwrap();
        assert_eq!(rows.len(), 1);

        backend.drop_collection("books").await.unwrap();
        assert!(matches!(
            backend.describe_alias("library").await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_share_the_collection_lock() {
        let backend = InMemoryBackend::new(DbConfig::immediate());
        backend.create_collection(create_request("demo", true)).await.unwrap();
        let (_, handle) = backend.engine.catalog.read().await.resolve("demo").unwrap();
        let held = handle.read().await;
        let rows = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            backend.query(QueryRequest::new("demo", "")),
        )
        .await
        .expect("query waited for the held read lock");
        assert!(rows.unwrap().is_empty());
        drop(held);
    }

    #[tokio::test]
    async fn test_writes_wait_for_flush() {
        let config = DbConfig {
            visibility_delay: std::time::Duration::from_secs(3600),
            ..DbConfig::immediate()
        };
        let backend = InMemoryBackend::new(config);
        backend.create_collection(create_request("demo", true)).await.unwrap();
        let row = json!({"id": 1, "vector": [0.0, 1.0]}).as_object().unwrap().clone();
        backend.insert(InsertRequest::new("demo", vec![row])).await.unwrap();

        assert!(backend.query(QueryRequest::new("demo", "")).await.unwrap().is_empty());
        assert_eq!(backend.describe_collection("demo").await.unwrap().row_count, 1);
        backend.flush("demo").await.unwrap();
        assert_eq!(backend.query(QueryRequest::new("demo", "")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_authorization_gates_sessions() {
        let config = DbConfig {
            authorization_enabled: true,
            ..DbConfig::immediate()
        };
        let root = InMemoryBackend::new(config);
        root.create_collection(create_request("secret", true)).await.unwrap();
        root.create_user("guest", "guest_pw").await.unwrap();

        assert!(matches!(
            root.authenticate("guest", "nope").await,
            Err(DbError::PermissionDenied(_))
        ));
        let guest = root.authenticate("guest", "guest_pw").await.unwrap();
        assert!(guest.describe_collection("secret").await.is_ok());
        assert!(matches!(
            guest.query(QueryRequest::new("secret", "")).await,
            Err(DbError::PermissionDenied(_))
        ));
    }
}
