//! Redemption code generation and normalization.

use rand::Rng;
use regex_lite::Regex;
use tracing::debug;

use super::{TicketError, TicketStore};
use crate::metrics::CODE_COLLISIONS;

/// Number of random characters after the prefix.
pub const CODE_RANDOM_LEN: usize = 8;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces codes of the form `{PREFIX}-{8 x [A-Z0-9]}`.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    prefix: String,
    max_attempts: u32,
    pattern: Regex,
}

impl CodeGenerator {
    pub fn new(prefix: &str, max_attempts: u32) -> Result<Self, TicketError> {
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TicketError::Validation(format!(
                "code prefix must be alphanumeric, got {:?}",
                prefix
            )));
        }
        let prefix = prefix.to_ascii_uppercase();
        let pattern = Regex::new(&format!("^{}-[A-Z0-9]{{{}}}$", prefix, CODE_RANDOM_LEN))
            .map_err(|e| TicketError::Validation(e.to_string()))?;

        Ok(Self {
            prefix,
            max_attempts: max_attempts.max(1),
            pattern,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// A fresh random candidate. Uniqueness is not checked.
    pub fn candidate<R: Rng>(&self, rng: &mut R) -> String {
        let random: String = (0..CODE_RANDOM_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{}-{}", self.prefix, random)
    }

    /// Draw candidates until one is not in the store.
    ///
    /// Deleted tickets count as taken. A code returned here can still lose an
    /// insert race; callers must treat `DuplicateCode` on insert as a retry.
    pub fn generate(&self, store: &dyn TicketStore) -> Result<String, TicketError> {
        let mut rng = rand::thread_rng();
        self.generate_with(store, &mut rng)
    }

    pub fn generate_with<R: Rng>(
        &self,
        store: &dyn TicketStore,
        rng: &mut R,
    ) -> Result<String, TicketError> {
        for attempt in 1..=self.max_attempts {
            let code = self.candidate(rng);
            if !store.code_exists(&code)? {
                return Ok(code);
            }
            CODE_COLLISIONS.inc();
            debug!(attempt, code = %code, "Generated code already taken");
        }

        Err(TicketError::GenerationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Whether `code` (already normalized) has the expected shape.
    pub fn is_valid(&self, code: &str) -> bool {
        self.pattern.is_match(code)
    }

    /// Canonical form of user-supplied input: trimmed and uppercased.
    pub fn normalize(input: &str) -> String {
        input.trim().to_ascii_uppercase()
    }
}
