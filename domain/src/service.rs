use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{error, warn};

use crate::code::generate_unique;
use crate::validate::Validator;
use crate::{Clock, CodeGenerator, CoreError, Repository, ShortCode, ShortUrl};

/// Tunables for code assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Length of generated codes.
    pub code_length: usize,
    /// Bound on both the existence pre-check loop and insert conflict retries.
    pub max_attempts: usize,
}

impl ServiceOptions {
    /// Both values must be at least 1.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.code_length == 0 {
            return Err(CoreError::InvalidOptions("code_length must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(CoreError::InvalidOptions("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            code_length: 8,
            max_attempts: 5,
        }
    }
}

/// Latest accepted expiry, 9999-12-31T23:59:59Z. Later instants cannot be
/// written as an RFC 3339 timestamp.
pub const MAX_EXPIRY_SECS: u64 = 253_402_300_799;

/// Result of an admin listing: one record looked up by code, or a search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Listing {
    One(ShortUrl),
    Many(Vec<ShortUrl>),
}

/// Application service for the short URL lifecycle: create, redirect, list,
/// and soft delete.
///
/// Generic over repository, code generator, and clock so the HTTP layer can
/// run against SQLite while tests use the in-memory repository and a manual
/// clock.
pub struct UrlService<R: Repository, G: CodeGenerator, C: Clock> {
    repo: R,
    generator: G,
    clock: C,
    validator: Validator,
    options: ServiceOptions,
}

impl<R: Repository, G: CodeGenerator, C: Clock> UrlService<R, G, C> {
    pub fn new(repo: R, generator: G, clock: C) -> Self {
        Self {
            repo,
            generator,
            clock,
            validator: Validator::default(),
            options: ServiceOptions::default(),
        }
    }

    /// Fails with `CoreError::InvalidOptions` when `options` is unusable.
    pub fn with_options(
        repo: R,
        generator: G,
        clock: C,
        validator: Validator,
        options: ServiceOptions,
    ) -> Result<Self, CoreError> {
        options.check()?;
        Ok(Self {
            repo,
            generator,
            clock,
            validator,
            options,
        })
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Validate `target_url` and store it under a fresh code.
    ///
    /// A zero or absent `expiry` means the record never expires; one ending
    /// after [`MAX_EXPIRY_SECS`] is `CoreError::InvalidExpiry`. Losing an
    /// insert race retries with a new code up to `max_attempts` times, after
    /// which `CoreError::Conflict` is returned.
    pub fn create(&self, target_url: &str, expiry: Option<Duration>) -> Result<ShortUrl, CoreError> {
        self.validator.validate(target_url)?;

        let now = self.clock.now();
        let expiry = match expiry.filter(|d| !d.is_zero()) {
            Some(d) => Some(expiry_after(now, d)?),
            None => None,
        };

        let mut last_conflict = None;
        for _ in 0..self.options.max_attempts {
            let code = generate_unique(
                &self.generator,
                self.options.code_length,
                self.options.max_attempts,
                |c| self.repo.exists_by_code(c),
            )
            .inspect_err(|e| error!(err = %e, "short code generation failed"))?;

            let record = ShortUrl::new(code, target_url.to_string(), expiry);
            match self.repo.insert(record.clone()) {
                Ok(()) => return Ok(record),
                Err(CoreError::Conflict(code)) => {
                    warn!(code = %code, "short code taken at insert, retrying");
                    last_conflict = Some(code);
                }
                Err(e) => {
                    error!(err = %e, "insert failed");
                    return Err(e);
                }
            }
        }
        Err(CoreError::Conflict(last_conflict.unwrap_or_default()))
    }

    /// Resolve a code to its target URL and count the hit.
    pub fn redirect(&self, code: &str) -> Result<String, CoreError> {
        let code = parse_code(code)?;
        let record = self.repo.find_by_code(&code)?.ok_or(CoreError::NotFound)?;
        if record.is_gone(self.clock.now()) {
            return Err(CoreError::Gone);
        }
        if self.repo.increment_hits(&code)? == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(record.target_url)
    }

    /// Look up one record by code, or search by target substring. Empty
    /// strings are treated as absent. Deleted records are included.
    pub fn list(&self, code: Option<&str>, url_substring: Option<&str>) -> Result<Listing, CoreError> {
        if let Some(code) = code.filter(|c| !c.is_empty()) {
            let code = parse_code(code)?;
            return self
                .repo
                .find_by_code(&code)?
                .map(Listing::One)
                .ok_or(CoreError::NotFound);
        }
        let substring = url_substring.filter(|s| !s.is_empty());
        Ok(Listing::Many(self.repo.search(substring)?))
    }

    /// Mark a record deleted. Repeating the call succeeds while the record
    /// exists.
    pub fn soft_delete(&self, code: &str) -> Result<(), CoreError> {
        let code = parse_code(code)?;
        if self.repo.mark_deleted(&code)? == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}

fn expiry_after(now: SystemTime, lifetime: Duration) -> Result<SystemTime, CoreError> {
    let limit = UNIX_EPOCH + Duration::from_secs(MAX_EXPIRY_SECS);
    match now.checked_add(lifetime) {
        Some(at) if at <= limit => Ok(at),
        _ => Err(CoreError::InvalidExpiry),
    }
}

// No record can exist under a malformed code.
fn parse_code(code: &str) -> Result<ShortCode, CoreError> {
    ShortCode::new(code).map_err(|_| CoreError::NotFound)
}
