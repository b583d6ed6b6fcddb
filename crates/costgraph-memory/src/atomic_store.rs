//! Read-modify-write of a JSONL composition store under an exclusive lock.
//!
//! The lock is a sibling file created with `create_new`; whoever creates it
//! owns the store until the file is removed. It records the owner's pid and
//! acquisition time so a busy error can say who holds it.

use crate::{MemoryStore, MemoryStoreError};
use chrono::Utc;
use costgraph_units::CostError;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// `<store>.lock`
pub fn store_lock_path(store_path: &Path) -> PathBuf {
    let mut path: OsString = store_path.as_os_str().to_os_string();
    path.push(".lock");
    PathBuf::from(path)
}

#[derive(Debug, thiserror::Error)]
pub enum AtomicStoreMutationError<E> {
    #[error("composition store locked: {} (holder: {})", lock_path.display(), holder.as_deref().unwrap_or("unknown"))]
    LockBusy {
        lock_path: PathBuf,
        holder: Option<String>,
    },

    #[error("cannot take composition store lock {}: {source}", lock_path.display())]
    Lock {
        lock_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(MemoryStoreError),

    #[error("{0}")]
    Mutation(E),
}

impl From<AtomicStoreMutationError<CostError>> for CostError {
    fn from(err: AtomicStoreMutationError<CostError>) -> Self {
        match err {
            AtomicStoreMutationError::Mutation(inner) => inner,
            AtomicStoreMutationError::Store(store) => store.into(),
            busy_or_io => CostError::repository(busy_or_io.to_string()),
        }
    }
}

/// Load the store at `path`, run `mutator`, and save if it reports a change.
///
/// `mutator` returns `(value, changed)`. The lock is held for the whole
/// call and released on every exit path.
pub fn mutate_store_jsonl<T, E, F>(
    path: impl AsRef<Path>,
    mutator: F,
) -> Result<T, AtomicStoreMutationError<E>>
where
    F: FnOnce(&mut MemoryStore) -> Result<(T, bool), E>,
{
    let path = path.as_ref();
    let _lock = StoreLock::acquire(path)?;

    let mut store = MemoryStore::load_jsonl(path).map_err(AtomicStoreMutationError::Store)?;
    let (value, changed) = mutator(&mut store).map_err(AtomicStoreMutationError::Mutation)?;
    if changed {
        store
            .save_jsonl(path)
            .map_err(AtomicStoreMutationError::Store)?;
    }
    Ok(value)
}

struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire<E>(store_path: &Path) -> Result<Self, AtomicStoreMutationError<E>> {
        let path = store_lock_path(store_path);
        let lock_err = |source| AtomicStoreMutationError::Lock {
            lock_path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(lock_err)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(AtomicStoreMutationError::LockBusy {
                    holder: read_holder(&path),
                    lock_path: path,
                });
            }
            Err(err) => return Err(lock_err(err)),
        };

        let stamp = format!("pid={}\nutc={}\n", std::process::id(), Utc::now().to_rfc3339());
        if let Err(err) = file.write_all(stamp.as_bytes()) {
            let _ = fs::remove_file(&path);
            return Err(lock_err(err));
        }
        Ok(Self { path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn read_holder(lock_path: &Path) -> Option<String> {
    let raw = fs::read_to_string(lock_path).ok()?;
    raw.lines()
        .find_map(|line| line.strip_prefix("pid="))
        .map(|pid| format!("pid {}", pid.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Composition;
    use costgraph_units::{CostErrorKind, Quantity};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch(prefix: &str) -> (PathBuf, PathBuf) {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "costgraph-lock-{prefix}-{}-{unique}",
            std::process::id()
        ));
        let store = dir.join("compositions.jsonl");
        (dir, store)
    }

    type Outcome<T> = Result<T, AtomicStoreMutationError<CostError>>;

    #[test]
    fn unchanged_mutation_does_not_create_the_store() {
        let (dir, path) = scratch("readonly");
        let count: Outcome<usize> = mutate_store_jsonl(&path, |store| Ok((store.len(), false)));
        assert_eq!(count.expect("empty read"), 0);
        assert!(!path.exists());
        assert!(!store_lock_path(&path).exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn changed_mutation_is_visible_to_the_next_one() {
        let (dir, path) = scratch("persist");
        let inserted: Outcome<()> = mutate_store_jsonl(&path, |store| {
            let flour = Composition::new("c-flour", Quantity::new(1.0, "kg"), Quantity::new(5.0, "kg"));
            store.insert(flour).map_err(CostError::from)?;
            Ok(((), true))
        });
        inserted.expect("insert persists");

        let stock: Outcome<Quantity> = mutate_store_jsonl(&path, |store| {
            let flour = store
                .composition("c-flour")
                .ok_or_else(|| CostError::composition_not_found("c-flour"))?;
            Ok((flour.stock.clone(), false))
        });
        assert_eq!(stock.expect("read back"), Quantity::new(5.0, "kg"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn foreign_lock_reports_its_holder() {
        let (dir, path) = scratch("busy");
        fs::create_dir_all(&dir).expect("dir");
        fs::write(store_lock_path(&path), "pid=4242\nutc=2024-05-01T00:00:00Z\n")
            .expect("lock fixture");

        let result: Outcome<()> = mutate_store_jsonl(&path, |_| Ok(((), true)));
        match result {
            Err(AtomicStoreMutationError::LockBusy { holder, .. }) => {
                assert_eq!(holder.as_deref(), Some("pid 4242"));
            }
            other => panic!("expected busy lock, got {other:?}"),
        }

        // The foreign lock is left alone.
        assert!(store_lock_path(&path).exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn failed_mutation_keeps_its_error_and_releases_the_lock() {
        let (dir, path) = scratch("fail");
        let result: Outcome<()> =
            mutate_store_jsonl(&path, |_| Err(CostError::composition_not_found("c-9")));
        let err = CostError::from(result.expect_err("mutation fails"));
        assert_eq!(err, CostError::composition_not_found("c-9"));
        assert!(!store_lock_path(&path).exists());

        let busy = AtomicStoreMutationError::<CostError>::LockBusy {
            lock_path: store_lock_path(&path),
            holder: None,
        };
        assert_eq!(CostError::from(busy).kind(), CostErrorKind::TransportFailure);
        let _ = fs::remove_dir_all(dir);
    }
}
