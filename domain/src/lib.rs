//! Domain library for the URL Shortener.
//!
//! Holds the short URL model, the ports (traits) the core needs from the
//! outside world, and the error taxonomy. Keep HTTP and storage drivers out
//! of this crate; they live in `apps/` and `adapters/`.

use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// A short code identifying a stored URL. ASCII letters only.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidCode("empty".into()));
        }
        if !val.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::InvalidCode("must contain letters only".into()));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored short URL record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortUrl {
    pub code: ShortCode,
    pub target_url: String,
    /// Absent means the record never expires.
    pub expiry: Option<SystemTime>,
    /// Successful redirects so far. Never decreases.
    pub hits: u64,
    /// Soft delete flag. Once set it is never cleared.
    pub deleted: bool,
}

impl ShortUrl {
    /// A fresh record: zero hits, not deleted.
    pub fn new(code: ShortCode, target_url: String, expiry: Option<SystemTime>) -> Self {
        Self {
            code,
            target_url,
            expiry,
            hits: 0,
            deleted: false,
        }
    }

    /// Check if the record has expired based on the given current time.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expiry.is_some_and(|exp| now >= exp)
    }

    /// Expired or soft-deleted records can no longer be redirected to.
    pub fn is_gone(&self, now: SystemTime) -> bool {
        self.deleted || self.is_expired(now)
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Short code generator. Implementations only produce candidates; uniqueness
/// is checked against the repository by [`code::generate_unique`].
pub trait CodeGenerator: Send + Sync {
    /// A candidate of exactly `length` letters. `length` must be at least 1.
    fn generate(&self, length: usize) -> Result<ShortCode, CoreError>;
}

/// Repository port for persisting and loading short URLs.
///
/// Records are never physically removed. `insert` must reject duplicate
/// codes atomically and `increment_hits` must not lose concurrent updates.
pub trait Repository: Send + Sync {
    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortUrl>, CoreError>;
    fn exists_by_code(&self, code: &ShortCode) -> Result<bool, CoreError>;
    /// Insert a new record. Returns `CoreError::Conflict` if the code is taken.
    fn insert(&self, record: ShortUrl) -> Result<(), CoreError>;
    /// Atomically add one hit. Returns the number of rows affected.
    fn increment_hits(&self, code: &ShortCode) -> Result<usize, CoreError>;
    /// Set the deleted flag. Returns the number of rows matched, so repeating
    /// the call on an already deleted record still reports 1.
    fn mark_deleted(&self, code: &ShortCode) -> Result<usize, CoreError>;
    /// All records whose target contains `substring` (case-sensitive), or
    /// every record, deleted ones included, when `None`.
    fn search(&self, substring: Option<&str>) -> Result<Vec<ShortUrl>, CoreError>;
}

/// Reasons a submitted target URL is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cannot be blank")]
    Empty,
    #[error("must be a valid URL")]
    Malformed,
    #[error("url is not allowed")]
    Blocked,
}

/// Core domain errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid short code: {0}")]
    InvalidCode(String),
    #[error("not found")]
    NotFound,
    #[error("expired")]
    Gone,
    #[error("expiry is out of range")]
    InvalidExpiry,
    #[error("invalid service options: {0}")]
    InvalidOptions(String),
    #[error("short code already in use: {0}")]
    Conflict(String),
    #[error("no unused short code found after {attempts} attempts")]
    Exhausted { attempts: usize },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{}", pkg, ver)
}

pub mod adapters;
pub mod code;
pub mod service;
pub mod validate;
