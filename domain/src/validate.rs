//! Target URL validation run before a short code is issued.

use regex::Regex;
use url::Url;

use crate::ValidationError;

/// Blocklist applied when none is configured.
pub const DEFAULT_BLOCKLIST: &str = "(?:facebook)";

/// Rejects empty, blocklisted, and malformed target URLs.
#[derive(Clone, Debug)]
pub struct Validator {
    blocklist: Regex,
}

impl Validator {
    /// Build a validator from a blocklist pattern. Matching is case-sensitive.
    pub fn new(blocklist: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            blocklist: Regex::new(blocklist)?,
        })
    }

    /// Run all checks in order; the first failure wins.
    pub fn validate(&self, url: &str) -> Result<(), ValidationError> {
        check_not_empty(url)?;
        self.check_block_list(url)?;
        check_well_formed(url)
    }

    pub fn check_block_list(&self, url: &str) -> Result<(), ValidationError> {
        if self.blocklist.is_match(url) {
            return Err(ValidationError::Blocked);
        }
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            blocklist: Regex::new(DEFAULT_BLOCKLIST).expect("default blocklist compiles"),
        }
    }
}

pub fn check_not_empty(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Err(ValidationError::Empty);
    }
    Ok(())
}

/// An absolute URL with a host, e.g. `https://example.com/path`.
pub fn check_well_formed(url: &str) -> Result<(), ValidationError> {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => Ok(()),
        _ => Err(ValidationError::Malformed),
    }
}
