//! Repository selection: memory or sqlite, chosen at startup.

use std::sync::Arc;

use domain::adapters::memory_repo::InMemoryRepo;
use domain::{CoreError, Repository, ShortCode, ShortUrl};
use tracing::{error, info};

use crate::config::{Config, StorageProvider};

enum RepoKind {
    Memory(InMemoryRepo),
    Sqlite(sqlite_adapter::SqliteRepo),
}

/// Cheaply cloneable handle over the configured backend.
#[derive(Clone)]
pub struct AnyRepo {
    kind: Arc<RepoKind>,
}

impl AnyRepo {
    pub fn memory() -> Self {
        Self {
            kind: Arc::new(RepoKind::Memory(InMemoryRepo::new())),
        }
    }

    pub fn sqlite(repo: sqlite_adapter::SqliteRepo) -> Self {
        Self {
            kind: Arc::new(RepoKind::Sqlite(repo)),
        }
    }

    /// Construct a repository instance based on config. Falls back to memory
    /// when the SQLite file cannot be opened.
    pub fn from_config(cfg: &Config) -> Self {
        match cfg.storage_provider {
            StorageProvider::Sqlite => {
                match sqlite_adapter::SqliteRepo::open_creating_dirs(&cfg.db_path) {
                    Ok(r) => {
                        info!(path = %cfg.db_path.display(), "using sqlite storage");
                        Self::sqlite(r)
                    }
                    Err(e) => {
                        error!(err = %e, path = %cfg.db_path.display(), "failed to open sqlite, falling back to memory");
                        Self::memory()
                    }
                }
            }
            StorageProvider::Memory => Self::memory(),
        }
    }
}

impl Repository for AnyRepo {
    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortUrl>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.find_by_code(code),
            RepoKind::Sqlite(r) => r.find_by_code(code),
        }
    }

    fn exists_by_code(&self, code: &ShortCode) -> Result<bool, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.exists_by_code(code),
            RepoKind::Sqlite(r) => r.exists_by_code(code),
        }
    }

    fn insert(&self, record: ShortUrl) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.insert(record),
            RepoKind::Sqlite(r) => r.insert(record),
        }
    }

    fn increment_hits(&self, code: &ShortCode) -> Result<usize, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.increment_hits(code),
            RepoKind::Sqlite(r) => r.increment_hits(code),
        }
    }

    fn mark_deleted(&self, code: &ShortCode) -> Result<usize, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.mark_deleted(code),
            RepoKind::Sqlite(r) => r.mark_deleted(code),
        }
    }

    fn search(&self, substring: Option<&str>) -> Result<Vec<ShortUrl>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.search(substring),
            RepoKind::Sqlite(r) => r.search(substring),
        }
    }
}
