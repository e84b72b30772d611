//! Short code generation.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{CodeGenerator, CoreError, ShortCode};

const ALPHABET: &[u8; 52] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Random letters from one generator that is seeded once and shared by all
/// callers. Not cryptographically secure.
#[derive(Debug)]
pub struct RandomCodeGenerator {
    rng: Mutex<StdRng>,
}

impl RandomCodeGenerator {
    /// Seed from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> Result<ShortCode, CoreError> {
        if length == 0 {
            return Err(CoreError::InvalidCode("length must be at least 1".into()));
        }
        // A poisoned lock still holds a usable rng.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let s: String = (0..length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        ShortCode::new(s)
    }
}

/// Draw codes until `exists` reports one as unused.
///
/// Fails with `CoreError::Exhausted` after `max_attempts` taken codes; errors
/// from `exists` are returned as-is.
pub fn generate_unique<G, F>(
    generator: &G,
    length: usize,
    max_attempts: usize,
    mut exists: F,
) -> Result<ShortCode, CoreError>
where
    G: CodeGenerator + ?Sized,
    F: FnMut(&ShortCode) -> Result<bool, CoreError>,
{
    for _ in 0..max_attempts {
        let code = generator.generate(length)?;
        if !exists(&code)? {
            return Ok(code);
        }
    }
    Err(CoreError::Exhausted {
        attempts: max_attempts,
    })
}
