use crate::constants::GENESIS_HASH;
use crate::error::{LedgerError, Result};
use crate::{pow, Block};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Append-only sequence of mined blocks.
///
/// `append` trusts the caller: the block is expected to come straight out of
/// the miner on top of the current tip. Use [`Ledger`] to get that check.
#[derive(Clone, Debug, Default)]
pub struct Chain {
    blocks: Vec<Block>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FaultReason {
    PreviousHashMismatch,
    HashMismatch,
    DifficultyNotMet,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultReason::PreviousHashMismatch => "Previous hash mismatch",
            FaultReason::HashMismatch => "Hash mismatch",
            FaultReason::DifficultyNotMet => "Difficulty target not met",
        })
    }
}

/// Result of a full-chain validation pass. `index` is the zero-based position
/// of the first block that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Validation {
    Valid,
    Invalid { index: usize, reason: FaultReason },
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Valid => f.write_str("PASSED"),
            Validation::Invalid { index, reason } => {
                write!(f, "FAILED at block {index}: {reason}")
            }
        }
    }
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Hash of the last block, or the genesis sentinel when empty.
    pub fn tip_hash(&self) -> &str {
        self.blocks
            .last()
            .map(|b| b.hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    pub fn append(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn pop_last(&mut self) -> Result<Block> {
        self.blocks.pop().ok_or(LedgerError::EmptyChainReversal)
    }

    /// Walk the chain from the first block and stop at the first one that
    /// breaks linkage, hash integrity or the difficulty target.
    pub fn validate(&self, difficulty: u32) -> Validation {
        let mut expected_prev: &str = GENESIS_HASH;
        for (index, block) in self.blocks.iter().enumerate() {
            let reason = if block.previous_hash != expected_prev {
                Some(FaultReason::PreviousHashMismatch)
            } else if block.recompute_hash() != block.hash {
                Some(FaultReason::HashMismatch)
            } else if !pow::meets_difficulty(&block.hash, difficulty) {
                Some(FaultReason::DifficultyNotMet)
            } else {
                None
            };
            if let Some(reason) = reason {
                warn!(index, %reason, "chain validation failed");
                return Validation::Invalid { index, reason };
            }
            expected_prev = block.hash.as_str();
        }
        Validation::Valid
    }
}

/// The chain together with its tip cursor and committed-block counter.
/// All three change together or not at all.
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Chain,
    tip: String,
    committed: u64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            chain: Chain::new(),
            tip: GENESIS_HASH.to_string(),
            committed: 0,
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn tip(&self) -> &str {
        &self.tip
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn commit(&mut self, block: Block) -> Result<()> {
        if block.previous_hash != self.tip {
            return Err(LedgerError::TipMismatch {
                expected: self.tip.clone(),
                found: block.previous_hash,
            });
        }
        self.tip = block.hash.clone();
        self.chain.append(block);
        self.committed += 1;
        info!(height = self.committed, tip = %self.tip, "block committed");
        self.debug_check();
        Ok(())
    }

    /// Retract the most recent block. The tip steps back to the removed
    /// block's `previous_hash`.
    pub fn reverse(&mut self) -> Result<Block> {
        let block = self.chain.pop_last()?;
        self.tip = block.previous_hash.clone();
        self.committed -= 1;
        info!(height = self.committed, tip = %self.tip, "block reversed");
        self.debug_check();
        Ok(block)
    }

    fn debug_check(&self) {
        debug_assert_eq!(self.committed, self.chain.len() as u64);
        debug_assert_eq!(self.tip, self.chain.tip_hash());
    }
}
