//! Repository contract for composition persistence, plus two backends.
//!
//! `MemoryRepository` keeps a `MemoryStore` behind an async lock.
//! `JsonlRepository` runs every call as a lock-scoped JSONL mutation on the
//! blocking pool, so several processes can share one store file.

use async_trait::async_trait;
use costgraph_memory::{
    AtomicStoreMutationError, Composition, MemoryStore, MemoryStoreError, mutate_store_jsonl,
};
use costgraph_units::CostError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Repository failures, keeping "not found" apart from storage trouble.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("composition not found: {0}")]
    NotFound(String),

    #[error("composition already exists: {0}")]
    AlreadyExists(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<MemoryStoreError> for RepositoryError {
    fn from(err: MemoryStoreError) -> Self {
        match err {
            MemoryStoreError::CompositionNotFound(id) => RepositoryError::NotFound(id),
            MemoryStoreError::CompositionAlreadyExists(id) => RepositoryError::AlreadyExists(id),
            MemoryStoreError::Jsonl(source) => RepositoryError::Storage(source.to_string()),
        }
    }
}

impl From<RepositoryError> for CostError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => CostError::composition_not_found(id),
            RepositoryError::AlreadyExists(id) => {
                CostError::validation("id", format!("composition already exists: {id}"))
            }
            RepositoryError::Storage(message) => CostError::repository(message),
        }
    }
}

#[async_trait]
pub trait CompositionRepository: Send + Sync {
    /// Lookup by ID, disabled compositions included.
    async fn find_by_id(&self, id: &str) -> Result<Composition, RepositoryError>;

    /// Enabled compositions whose dependencies reference `id`.
    async fn find_uses(&self, id: &str) -> Result<Vec<Composition>, RepositoryError>;

    /// Every stored composition in ID order.
    async fn find_all(&self) -> Result<Vec<Composition>, RepositoryError>;

    async fn insert(&self, composition: &Composition) -> Result<(), RepositoryError>;

    async fn update(&self, composition: &Composition) -> Result<(), RepositoryError>;

    /// Soft delete; returns the disabled composition.
    async fn delete(&self, id: &str) -> Result<Composition, RepositoryError>;
}

#[async_trait]
impl<T: CompositionRepository + ?Sized> CompositionRepository for Arc<T> {
    async fn find_by_id(&self, id: &str) -> Result<Composition, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn find_uses(&self, id: &str) -> Result<Vec<Composition>, RepositoryError> {
        (**self).find_uses(id).await
    }

    async fn find_all(&self) -> Result<Vec<Composition>, RepositoryError> {
        (**self).find_all().await
    }

    async fn insert(&self, composition: &Composition) -> Result<(), RepositoryError> {
        (**self).insert(composition).await
    }

    async fn update(&self, composition: &Composition) -> Result<(), RepositoryError> {
        (**self).update(composition).await
    }

    async fn delete(&self, id: &str) -> Result<Composition, RepositoryError> {
        (**self).delete(id).await
    }
}

/// In-process repository over a [`MemoryStore`].
#[derive(Debug, Default)]
pub struct MemoryRepository {
    store: RwLock<MemoryStore>,
}

impl MemoryRepository {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> MemoryStore {
        self.store.read().await.clone()
    }
}

#[async_trait]
impl CompositionRepository for MemoryRepository {
    async fn find_by_id(&self, id: &str) -> Result<Composition, RepositoryError> {
        self.store
            .read()
            .await
            .composition(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn find_uses(&self, id: &str) -> Result<Vec<Composition>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .uses_of(id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<Composition>, RepositoryError> {
        Ok(self.store.read().await.compositions().cloned().collect())
    }

    async fn insert(&self, composition: &Composition) -> Result<(), RepositoryError> {
        self.store.write().await.insert(composition.clone())?;
        Ok(())
    }

    async fn update(&self, composition: &Composition) -> Result<(), RepositoryError> {
        self.store.write().await.update(composition.clone())?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<Composition, RepositoryError> {
        let mut store = self.store.write().await;
        Ok(store.disable(id)?.clone())
    }
}

pub const DEFAULT_LOCK_RETRIES: u32 = 20;
pub const DEFAULT_LOCK_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Repository over a JSONL file guarded by a sibling lock file.
///
/// Calls from this process are serialized; a lock held by another process
/// is retried a bounded number of times before surfacing as a storage
/// failure.
#[derive(Debug)]
pub struct JsonlRepository {
    path: PathBuf,
    local: Mutex<()>,
    lock_retries: u32,
    lock_retry_delay: Duration,
}

impl JsonlRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            local: Mutex::new(()),
            lock_retries: DEFAULT_LOCK_RETRIES,
            lock_retry_delay: DEFAULT_LOCK_RETRY_DELAY,
        }
    }

    pub fn with_lock_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.lock_retries = retries;
        self.lock_retry_delay = delay;
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn mutate<T, F>(&self, mutator: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: Fn(&mut MemoryStore) -> Result<(T, bool), RepositoryError> + Send + Sync + 'static,
    {
        let _local = self.local.lock().await;
        let mutator = Arc::new(mutator);
        let mut attempt = 0;
        loop {
            let path = self.path.clone();
            let step = Arc::clone(&mutator);
            let outcome =
                tokio::task::spawn_blocking(move || mutate_store_jsonl(&path, |store| (*step)(store)))
                    .await
                    .map_err(|e| RepositoryError::Storage(format!("blocking task failed: {e}")))?;

            match outcome {
                Ok(value) => return Ok(value),
                Err(AtomicStoreMutationError::LockBusy { lock_path, holder })
                    if attempt < self.lock_retries =>
                {
                    attempt += 1;
                    debug!(
                        lock_path = %lock_path.display(),
                        holder = holder.as_deref().unwrap_or("unknown"),
                        attempt,
                        "store lock busy, retrying"
                    );
                    tokio::time::sleep(self.lock_retry_delay).await;
                }
                Err(AtomicStoreMutationError::Mutation(err)) => return Err(err),
                Err(AtomicStoreMutationError::Store(err)) => return Err(err.into()),
                Err(other) => return Err(RepositoryError::Storage(other.to_string())),
            }
        }
    }
}

#[async_trait]
impl CompositionRepository for JsonlRepository {
    async fn find_by_id(&self, id: &str) -> Result<Composition, RepositoryError> {
        let id = id.to_string();
        self.mutate(move |store| {
            store
                .composition(&id)
                .cloned()
                .map(|c| (c, false))
                .ok_or_else(|| RepositoryError::NotFound(id.clone()))
        })
        .await
    }

    async fn find_uses(&self, id: &str) -> Result<Vec<Composition>, RepositoryError> {
        let id = id.to_string();
        self.mutate(move |store| {
            let uses = store.uses_of(&id).into_iter().cloned().collect();
            Ok((uses, false))
        })
        .await
    }

    async fn find_all(&self) -> Result<Vec<Composition>, RepositoryError> {
        self.mutate(|store| Ok((store.compositions().cloned().collect(), false)))
            .await
    }

    async fn insert(&self, composition: &Composition) -> Result<(), RepositoryError> {
        let composition = composition.clone();
        self.mutate(move |store| {
            store.insert(composition.clone())?;
            Ok(((), true))
        })
        .await
    }

    async fn update(&self, composition: &Composition) -> Result<(), RepositoryError> {
        let composition = composition.clone();
        self.mutate(move |store| {
            store.update(composition.clone())?;
            Ok(((), true))
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<Composition, RepositoryError> {
        let id = id.to_string();
        self.mutate(move |store| Ok((store.disable(&id)?.clone(), true)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costgraph_memory::{Dependency, store_lock_path};
    use costgraph_units::Quantity;

    fn composition(id: &str, deps: &[&str]) -> Composition {
        let mut c = Composition::new(id, Quantity::new(1.0, "kg"), Quantity::new(0.0, "kg"));
        for of in deps {
            c.upsert_dependency(Dependency::new(*of, Quantity::new(0.5, "kg")));
        }
        c
    }

    fn temp_store(prefix: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!(
                "costgraph-repo-{prefix}-{}-{}",
                std::process::id(),
                uuid::Uuid::new_v4()
            ))
            .join("compositions.jsonl")
    }

    async fn exercise(repo: &dyn CompositionRepository) {
        repo.insert(&composition("c-flour", &[])).await.expect("insert flour");
        repo.insert(&composition("c-dough", &["c-flour"]))
            .await
            .expect("insert dough");

        let err = repo
            .insert(&composition("c-flour", &[]))
            .await
            .expect_err("duplicate insert");
        assert_eq!(err, RepositoryError::AlreadyExists("c-flour".into()));

        let uses = repo.find_uses("c-flour").await.expect("uses");
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].id, "c-dough");

        let mut flour = repo.find_by_id("c-flour").await.expect("flour");
        flour.cost = 9.0;
        repo.update(&flour).await.expect("update flour");
        assert_eq!(repo.find_by_id("c-flour").await.expect("flour").cost, 9.0);

        let deleted = repo.delete("c-dough").await.expect("delete dough");
        assert!(!deleted.enabled);
        assert!(repo.find_uses("c-flour").await.expect("uses").is_empty());
        assert_eq!(repo.find_all().await.expect("all").len(), 2);

        let err = repo.find_by_id("c-missing").await.expect_err("missing");
        assert_eq!(err, RepositoryError::NotFound("c-missing".into()));
        assert_eq!(
            CostError::from(err),
            CostError::composition_not_found("c-missing")
        );
    }

    #[tokio::test]
    async fn memory_repository_contract() {
        let repo = MemoryRepository::default();
        exercise(&repo).await;
        assert_eq!(repo.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn jsonl_repository_contract() {
        let path = temp_store("contract");
        let repo = JsonlRepository::new(&path);
        exercise(&repo).await;

        let reloaded = MemoryStore::load_jsonl(&path).expect("store reloads");
        assert_eq!(reloaded.len(), 2);
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn jsonl_repository_gives_up_on_foreign_lock() {
        let path = temp_store("busy");
        let dir = path.parent().expect("store has a parent").to_path_buf();
        std::fs::create_dir_all(&dir).expect("dir");
        std::fs::write(store_lock_path(&path), "pid=0\n").expect("lock fixture");

        let repo = JsonlRepository::new(&path).with_lock_retry(2, Duration::from_millis(1));
        let err = repo.find_all().await.expect_err("lock never frees");
        assert!(matches!(err, RepositoryError::Storage(_)));

        let _ = std::fs::remove_dir_all(dir);
    }
}
