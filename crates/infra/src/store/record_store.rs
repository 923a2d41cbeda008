use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ims_core::{AggregateRoot, ExpectedVersion};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("version conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Versioned record store.
///
/// Writes bump the stored version by one; `insert` stores version 1.
pub trait RecordStore<T: AggregateRoot>: Send + Sync {
    fn get(&self, id: &T::Id) -> Result<Option<T>, StoreError>;

    fn list(&self) -> Result<Vec<T>, StoreError>;

    /// Query by predicate.
    fn find(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, StoreError>;

    /// Insert a new record, failing if any existing record satisfies `conflicts`.
    fn insert_unless(
        &self,
        record: T,
        conflicts: &dyn Fn(&T) -> bool,
    ) -> Result<T, StoreError>;

    /// Replace a record if its stored version matches `expected` and no other
    /// record satisfies `conflicts`.
    fn update_unless(
        &self,
        record: T,
        expected: ExpectedVersion,
        conflicts: &dyn Fn(&T) -> bool,
    ) -> Result<T, StoreError>;

    fn delete(&self, id: &T::Id) -> Result<Option<T>, StoreError>;

    /// Remove every record matching `predicate`, returning what was removed.
    fn delete_where(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, StoreError>;

    fn insert(&self, record: T) -> Result<T, StoreError> {
        self.insert_unless(record, &|_| false)
    }

    fn update(&self, record: T, expected: ExpectedVersion) -> Result<T, StoreError> {
        self.update_unless(record, expected, &|_| false)
    }

    /// Fetch a record or fail with `NotFound`.
    fn require(&self, id: &T::Id) -> Result<T, StoreError> {
        self.get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

impl<T, S> RecordStore<T> for Arc<S>
where
    T: AggregateRoot,
    S: RecordStore<T> + ?Sized,
{
    fn get(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        (**self).list()
    }

    fn find(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        (**self).find(predicate)
    }

    fn insert_unless(
        &self,
        record: T,
        conflicts: &dyn Fn(&T) -> bool,
    ) -> Result<T, StoreError> {
        (**self).insert_unless(record, conflicts)
    }

    fn update_unless(
        &self,
        record: T,
        expected: ExpectedVersion,
        conflicts: &dyn Fn(&T) -> bool,
    ) -> Result<T, StoreError> {
        (**self).update_unless(record, expected, conflicts)
    }

    fn delete(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        (**self).delete(id)
    }

    fn delete_where(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        (**self).delete_where(predicate)
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryRecordStore<T: AggregateRoot> {
    inner: RwLock<HashMap<T::Id, T>>,
}

impl<T: AggregateRoot> InMemoryRecordStore<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl<T: AggregateRoot> Default for InMemoryRecordStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E>(_: E) -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

impl<T> RecordStore<T> for InMemoryRecordStore<T>
where
    T: AggregateRoot + Clone + Send + Sync + 'static,
    T::Id: Send + Sync,
{
    fn get(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.values().cloned().collect())
    }

    fn find(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.values().filter(|r| predicate(r)).cloned().collect())
    }

    fn insert_unless(
        &self,
        mut record: T,
        conflicts: &dyn Fn(&T) -> bool,
    ) -> Result<T, StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        let id = *record.id();
        if map.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        if let Some(existing) = map.values().find(|r| conflicts(r)) {
            return Err(StoreError::AlreadyExists(existing.id().to_string()));
        }
        record.set_version(1);
        map.insert(id, record.clone());
        Ok(record)
    }

    fn update_unless(
        &self,
        mut record: T,
        expected: ExpectedVersion,
        conflicts: &dyn Fn(&T) -> bool,
    ) -> Result<T, StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        let id = *record.id();
        let current = map
            .get(&id)
            .map(|r| r.version())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        expected
            .check(current)
            .map_err(|e| StoreError::Conflict(format!("{id}: {e}")))?;
        if let Some(existing) = map.values().find(|r| *r.id() != id && conflicts(r)) {
            return Err(StoreError::AlreadyExists(existing.id().to_string()));
        }
        record.set_version(current + 1);
        map.insert(id, record.clone());
        Ok(record)
    }

    fn delete(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        Ok(map.remove(id))
    }

    fn delete_where(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        let ids: Vec<T::Id> = map
            .values()
            .filter(|r| predicate(r))
            .map(|r| *r.id())
            .collect();
        Ok(ids.into_iter().filter_map(|id| map.remove(&id)).collect())
    }
}
