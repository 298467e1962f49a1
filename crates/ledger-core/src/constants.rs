pub const GENESIS_HASH: &str = "GENESIS";
pub const MIN_DIFFICULTY: u32 = 1;
pub const MAX_DIFFICULTY: u32 = 6;
pub const DEFAULT_DIFFICULTY: u32 = 4;
/// Floor for the per-block nonce budget at any difficulty.
pub const DEFAULT_MAX_ATTEMPTS: u64 = 1_000_000;
/// Multiple of the expected `16^d` attempts granted by the default budget.
pub const ATTEMPT_HEADROOM: u64 = 32;
pub const DEFAULT_MIN_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 1_500;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
