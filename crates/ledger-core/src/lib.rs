use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod chain;
pub mod constants;
pub mod error;
pub mod rules;
pub mod sim;
pub mod txgen;

pub use chain::{Chain, FaultReason, Ledger, Validation};
pub use error::{LedgerError, Result};
pub use rules::{Outcome, Rule, RuleEngine};
pub use sim::{SimConfig, SimState, Simulation, StepEvent, Summary};
pub use txgen::TxGenerator;

use constants::TIMESTAMP_FORMAT;

/// Lowercase hex SHA-256 of the concatenation of `parts`.
pub fn digest_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// First `len` characters of a hash, or the whole string when shorter.
pub fn short_hash(hash: &str, len: usize) -> &str {
    hash.get(..len).unwrap_or(hash)
}

/// Wall-clock time in the fixed block timestamp pattern.
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Deposit,
    Withdraw,
    Transfer,
    Exchange,
    Loan,
    Payment,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Deposit,
        Category::Withdraw,
        Category::Transfer,
        Category::Exchange,
        Category::Loan,
        Category::Payment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Deposit => "DEPOSIT",
            Category::Withdraw => "WITHDRAW",
            Category::Transfer => "TRANSFER",
            Category::Exchange => "EXCHANGE",
            Category::Loan => "LOAN",
            Category::Payment => "PAYMENT",
        }
    }

    /// The fixed Markov transition set out of this category.
    pub fn successors(self) -> [Category; 3] {
        use Category::*;
        match self {
            Deposit => [Withdraw, Transfer, Payment],
            Withdraw => [Deposit, Transfer, Exchange],
            Transfer => [Payment, Exchange, Loan],
            Exchange => [Transfer, Deposit, Withdraw],
            Loan => [Payment, Deposit, Transfer],
            Payment => [Deposit, Loan, Exchange],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub timestamp: String,
    pub category: Category,
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub currency: String,
}

impl Transaction {
    /// The string that gets hashed during mining. It commits to the previous
    /// block's hash, so the same transaction mined on a different tip yields
    /// a different block.
    pub fn payload(&self, previous_hash: &str) -> String {
        format!(
            "{}|{}|{}->{}|{} {}|PrevHash: {}",
            self.timestamp,
            self.category,
            self.from,
            self.to,
            self.amount,
            self.currency,
            previous_hash
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: String,
    pub payload: String,
    pub nonce: u64,
    pub hash: String,
    pub previous_hash: String,
}

impl Block {
    /// Build the payload for `tx` on top of `previous_hash` and search for a
    /// nonce. No block exists unless the search succeeds.
    pub fn mine(
        tx: &Transaction,
        previous_hash: &str,
        difficulty: u32,
        max_attempts: u64,
    ) -> Result<Block> {
        let payload = tx.payload(previous_hash);
        let proof = pow::mine(&payload, difficulty, max_attempts)?;
        Ok(Block {
            timestamp: tx.timestamp.clone(),
            payload,
            nonce: proof.nonce,
            hash: proof.hash,
            previous_hash: previous_hash.to_string(),
        })
    }

    pub fn recompute_hash(&self) -> String {
        pow::attempt_hash(&self.payload, self.nonce)
    }

}

pub mod pow {
    use crate::constants::{
        ATTEMPT_HEADROOM, DEFAULT_MAX_ATTEMPTS, MAX_DIFFICULTY, MIN_DIFFICULTY,
    };
    use crate::digest_hex;
    use crate::error::{LedgerError, Result};
    use tracing::{debug, warn};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Proof {
        pub hash: String,
        pub nonce: u64,
        /// Number of digests computed, including the winning one.
        pub attempts: u64,
    }

    /// Digest of `payload ++ decimal(nonce)`.
    pub fn attempt_hash(payload: &str, nonce: u64) -> String {
        digest_hex(&[payload.as_bytes(), nonce.to_string().as_bytes()])
    }

    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let d = difficulty as usize;
        hash.len() >= d && hash.bytes().take(d).all(|b| b == b'0')
    }

    pub fn count_leading_zero_hex(hash: &str) -> u32 {
        hash.bytes().take_while(|b| *b == b'0').count() as u32
    }

    pub fn check_difficulty(difficulty: u32) -> Result<()> {
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
            return Err(LedgerError::InvalidConfiguration(format!(
                "difficulty {difficulty} is outside {MIN_DIFFICULTY}..={MAX_DIFFICULTY}"
            )));
        }
        Ok(())
    }

    /// Nonce budget used when none is configured: `ATTEMPT_HEADROOM` times the
    /// expected `16^d` attempts, never below `DEFAULT_MAX_ATTEMPTS`.
    pub fn default_max_attempts(difficulty: u32) -> u64 {
        16u64
            .checked_pow(difficulty)
            .map_or(u64::MAX, |expected| expected.saturating_mul(ATTEMPT_HEADROOM))
            .max(DEFAULT_MAX_ATTEMPTS)
    }

    /// Search nonces upward from 0 until the digest has `difficulty` leading
    /// zero hex digits.
    pub fn mine(payload: &str, difficulty: u32, max_attempts: u64) -> Result<Proof> {
        mine_from(payload, difficulty, 0, max_attempts)
    }

    /// Like [`mine`] but starting at `start_nonce`. Returns the first
    /// satisfying nonce in ascending order.
    pub fn mine_from(
        payload: &str,
        difficulty: u32,
        start_nonce: u64,
        max_attempts: u64,
    ) -> Result<Proof> {
        check_difficulty(difficulty)?;
        if payload.is_empty() {
            return Err(LedgerError::InvalidConfiguration(
                "payload must not be empty".into(),
            ));
        }
        if max_attempts == 0 {
            return Err(LedgerError::InvalidConfiguration(
                "max attempts 0 must be positive".into(),
            ));
        }

        let mut nonce = start_nonce;
        let mut attempts = 0u64;
        while attempts < max_attempts {
            attempts += 1;
            let hash = attempt_hash(payload, nonce);
            if meets_difficulty(&hash, difficulty) {
                debug!(nonce, attempts, %hash, "mined payload");
                return Ok(Proof {
                    hash,
                    nonce,
                    attempts,
                });
            }
            // Nonce space is finite; running off the end counts as exhaustion.
            match nonce.checked_add(1) {
                Some(next) => nonce = next,
                None => break,
            }
        }

        warn!(attempts, difficulty, "nonce search exhausted");
        Err(LedgerError::MiningExhausted {
            attempts,
            difficulty,
        })
    }
}
