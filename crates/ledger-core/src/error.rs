use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Rejected before any mining starts.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The nonce search ran out of budget. Nothing was appended.
    #[error("mining exhausted: no nonce within {attempts} attempts meets difficulty {difficulty}")]
    MiningExhausted { attempts: u64, difficulty: u32 },

    #[error("cannot reverse: chain is empty")]
    EmptyChainReversal,

    #[error("block does not extend the tip: expected previous hash {expected}, found {found}")]
    TipMismatch { expected: String, found: String },

    #[error("simulation is {actual}, operation requires {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}
