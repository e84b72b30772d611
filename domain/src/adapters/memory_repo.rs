use std::collections::HashMap;
use std::sync::Mutex;

use crate::{CoreError, Repository, ShortCode, ShortUrl};

/// Simple in-memory repository for tests and local runs. All operations take
/// the same lock, which makes insert-if-absent and hit increments atomic.
pub struct InMemoryRepo {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: Vec<ShortUrl>,
    // code -> position in `records`; keeps listing in insertion order
    index: HashMap<String, usize>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, CoreError> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Storage("mutex poisoned".into()))
    }

    /// Number of stored records, deleted ones included.
    pub fn len(&self) -> Result<usize, CoreError> {
        Ok(self.lock()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn get_mut(&mut self, code: &ShortCode) -> Option<&mut ShortUrl> {
        let pos = *self.index.get(code.as_str())?;
        self.records.get_mut(pos)
    }
}

impl Repository for InMemoryRepo {
    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortUrl>, CoreError> {
        let inner = self.lock()?;
        Ok(inner
            .index
            .get(code.as_str())
            .and_then(|&pos| inner.records.get(pos))
            .cloned())
    }

    fn exists_by_code(&self, code: &ShortCode) -> Result<bool, CoreError> {
        Ok(self.lock()?.index.contains_key(code.as_str()))
    }

    fn insert(&self, record: ShortUrl) -> Result<(), CoreError> {
        let mut inner = self.lock()?;
        let key = record.code.as_str().to_string();
        if inner.index.contains_key(&key) {
            return Err(CoreError::Conflict(key));
        }
        let pos = inner.records.len();
        inner.records.push(record);
        inner.index.insert(key, pos);
        Ok(())
    }

    fn increment_hits(&self, code: &ShortCode) -> Result<usize, CoreError> {
        let mut inner = self.lock()?;
        match inner.get_mut(code) {
            Some(record) => {
                record.hits = record.hits.saturating_add(1);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn mark_deleted(&self, code: &ShortCode) -> Result<usize, CoreError> {
        let mut inner = self.lock()?;
        match inner.get_mut(code) {
            Some(record) => {
                record.deleted = true;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn search(&self, substring: Option<&str>) -> Result<Vec<ShortUrl>, CoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .iter()
            .filter(|r| substring.map_or(true, |s| r.target_url.contains(s)))
            .cloned()
            .collect())
    }
}
