//! One-writer simulation loop: generate a transaction, run the hidden rules,
//! then skip, reverse, or mine and commit.
//!
//! The loop itself is synchronous. Sleeping between blocks and listening for
//! cancellation belong to the caller, which asks for [`Simulation::next_delay`]
//! and calls [`Simulation::stop`] when it wants out of an unbounded run.

use crate::chain::{Ledger, Validation};
use crate::constants::{DEFAULT_DIFFICULTY, DEFAULT_MAX_DELAY_MS, DEFAULT_MIN_DELAY_MS};
use crate::error::{LedgerError, Result};
use crate::rules::{Outcome, RuleEngine};
use crate::txgen::TxGenerator;
use crate::{pow, Block, Transaction};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimConfig {
    /// Stop after this many committed blocks. `None` runs until cancelled.
    pub blocks: Option<u64>,
    pub difficulty: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            blocks: None,
            difficulty: DEFAULT_DIFFICULTY,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: pow::default_max_attempts(DEFAULT_DIFFICULTY),
        }
    }
}

impl SimConfig {
    /// Defaults at `difficulty`, with the nonce budget sized for it.
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            max_attempts: pow::default_max_attempts(difficulty),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.blocks == Some(0) {
            return Err(LedgerError::InvalidConfiguration(
                "block count 0 must be a positive integer".into(),
            ));
        }
        pow::check_difficulty(self.difficulty)?;
        if self.min_delay_ms > self.max_delay_ms {
            return Err(LedgerError::InvalidConfiguration(format!(
                "min delay {}ms exceeds max delay {}ms",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if self.max_attempts == 0 {
            return Err(LedgerError::InvalidConfiguration(
                "max attempts 0 must be a positive integer".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimState {
    Running,
    Stopping,
    Validating,
    Done,
}

impl SimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimState::Running => "running",
            SimState::Stopping => "stopping",
            SimState::Validating => "validating",
            SimState::Done => "done",
        }
    }
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single iteration did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepEvent {
    /// Abandoned before mining.
    Blocked { tx: Transaction },
    /// The previous block was retracted. `removed` is `None` when the chain
    /// was already empty.
    Reversed {
        tx: Transaction,
        removed: Option<Block>,
    },
    Committed {
        block: Block,
        flagged: bool,
        count: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub validation: Validation,
    pub committed: u64,
    pub chain_len: usize,
    pub tip: String,
    pub blocked: u64,
    pub reversed: u64,
    pub flagged: u64,
}

pub struct Simulation<R: Rng> {
    config: SimConfig,
    ledger: Ledger,
    generator: TxGenerator,
    rules: RuleEngine,
    rng: R,
    state: SimState,
    validation: Option<Validation>,
    blocked: u64,
    reversed: u64,
    flagged: u64,
}

impl<R: Rng> Simulation<R> {
    /// Simulation with the stock hidden rules.
    pub fn new(config: SimConfig, rng: R) -> Result<Self> {
        Self::with_rules(config, RuleEngine::hidden_rules(), rng)
    }

    pub fn with_rules(config: SimConfig, rules: RuleEngine, rng: R) -> Result<Self> {
        config.validate()?;
        debug!(rules = ?rules.describe(), ?config, "simulation configured");
        Ok(Self {
            config,
            ledger: Ledger::new(),
            generator: TxGenerator::default(),
            rules,
            rng,
            state: SimState::Running,
            validation: None,
            blocked: 0,
            reversed: 0,
            flagged: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    fn expect_state(&self, expected: SimState) -> Result<()> {
        if self.state != expected {
            return Err(LedgerError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            });
        }
        Ok(())
    }

    pub fn step(&mut self) -> Result<StepEvent> {
        self.expect_state(SimState::Running)?;

        let tx = self.generator.next_tx(&mut self.rng);
        let outcome = self.rules.evaluate(&tx.from, &tx.currency, &mut self.rng);

        match outcome {
            Outcome::Blocked => {
                self.blocked += 1;
                info!(from = %tx.from, currency = %tx.currency, "transaction blocked");
                Ok(StepEvent::Blocked { tx })
            }
            Outcome::Reversed => {
                let removed = match self.ledger.reverse() {
                    Ok(block) => {
                        self.reversed += 1;
                        Some(block)
                    }
                    Err(LedgerError::EmptyChainReversal) => None,
                    Err(e) => return Err(e),
                };
                Ok(StepEvent::Reversed { tx, removed })
            }
            Outcome::None | Outcome::Suspicious => {
                let block = Block::mine(
                    &tx,
                    self.ledger.tip(),
                    self.config.difficulty,
                    self.config.max_attempts,
                )?;
                self.ledger.commit(block.clone())?;

                let flagged = outcome == Outcome::Suspicious;
                if flagged {
                    self.flagged += 1;
                }
                let count = self.ledger.committed();
                if self.config.blocks.is_some_and(|bound| count >= bound) {
                    self.state = SimState::Stopping;
                }
                Ok(StepEvent::Committed {
                    block,
                    flagged,
                    count,
                })
            }
        }
    }

    /// External cancellation of a running simulation.
    pub fn stop(&mut self) -> Result<()> {
        self.expect_state(SimState::Running)?;
        self.state = SimState::Stopping;
        Ok(())
    }

    pub fn validate(&mut self) -> Result<Validation> {
        self.expect_state(SimState::Stopping)?;
        let validation = self.ledger.chain().validate(self.config.difficulty);
        self.validation = Some(validation);
        self.state = SimState::Validating;
        Ok(validation)
    }

    pub fn finish(&mut self) -> Result<Summary> {
        self.expect_state(SimState::Validating)?;
        let validation = self.validation.unwrap_or(Validation::Valid);
        self.state = SimState::Done;
        Ok(Summary {
            validation,
            committed: self.ledger.committed(),
            chain_len: self.ledger.chain().len(),
            tip: self.ledger.tip().to_string(),
            blocked: self.blocked,
            reversed: self.reversed,
            flagged: self.flagged,
        })
    }

    /// Uniform pause in `[min_delay_ms, max_delay_ms]`.
    pub fn next_delay(&mut self) -> Duration {
        let ms = self
            .rng
            .gen_range(self.config.min_delay_ms..=self.config.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Drive a bounded run through every state without pausing.
    pub fn run_to_completion(&mut self) -> Result<Summary> {
        if self.config.blocks.is_none() {
            return Err(LedgerError::InvalidConfiguration(
                "an unbounded run has no completion".into(),
            ));
        }
        while self.state == SimState::Running {
            self.step()?;
        }
        self.validate()?;
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GENESIS_HASH;
    use crate::rules::{Always, Chance, Rule};
    use crate::txgen::CURRENCIES;
    use rand::{rngs::StdRng, SeedableRng};

    fn config(blocks: u64) -> SimConfig {
        SimConfig {
            blocks: Some(blocks),
            difficulty: 1,
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..SimConfig::default()
        }
    }

    fn every_currency<T: Rule + Copy + 'static>(rule: T) -> RuleEngine {
        CURRENCIES
            .iter()
            .fold(RuleEngine::new(), |engine, c| engine.with_currency_rule(c, rule))
    }

    #[test]
    fn config_validation_names_offending_value() {
        let bad = [
            SimConfig {
                blocks: Some(0),
                ..SimConfig::default()
            },
            SimConfig {
                difficulty: 0,
                ..SimConfig::default()
            },
            SimConfig {
                difficulty: 7,
                ..SimConfig::default()
            },
            SimConfig {
                min_delay_ms: 10,
                max_delay_ms: 5,
                ..SimConfig::default()
            },
            SimConfig {
                max_attempts: 0,
                ..SimConfig::default()
            },
        ];
        let needles = ["0", "difficulty 0", "difficulty 7", "10ms", "0"];
        for (cfg, needle) in bad.iter().zip(needles) {
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, LedgerError::InvalidConfiguration(_)));
            assert!(err.to_string().contains(needle), "{err}");
        }
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn budget_follows_difficulty() {
        let hard = SimConfig::with_difficulty(6);
        assert!(hard.validate().is_ok());
        assert!(hard.max_attempts >= 16u64.pow(6) * 32);
        assert!(SimConfig::with_difficulty(5).max_attempts >= 16u64.pow(5) * 32);
        assert_eq!(
            SimConfig::default().max_attempts,
            pow::default_max_attempts(DEFAULT_DIFFICULTY)
        );
    }

    #[test]
    fn new_rejects_invalid_config() {
        let cfg = SimConfig {
            difficulty: 9,
            ..SimConfig::default()
        };
        assert!(Simulation::new(cfg, StdRng::seed_from_u64(1)).is_err());
    }

    #[test]
    fn no_rules_commits_every_step() {
        let mut sim =
            Simulation::with_rules(config(5), RuleEngine::new(), StdRng::seed_from_u64(1)).unwrap();
        for expected in 1..=5 {
            match sim.step().unwrap() {
                StepEvent::Committed { count, flagged, .. } => {
                    assert_eq!(count, expected);
                    assert!(!flagged);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(sim.state(), SimState::Stopping);
        assert!(matches!(sim.step(), Err(LedgerError::InvalidState { .. })));
        assert!(sim.validate().unwrap().is_valid());
        let summary = sim.finish().unwrap();
        assert_eq!(sim.state(), SimState::Done);
        assert_eq!(summary.committed, 5);
        assert_eq!(summary.chain_len, 5);
        assert_eq!(summary.tip, sim.ledger().chain().tip_hash());
    }

    #[test]
    fn reversal_on_empty_chain_is_a_noop() {
        let rules = every_currency(Always(Outcome::Reversed));
        let mut sim = Simulation::with_rules(config(1), rules, StdRng::seed_from_u64(2)).unwrap();
        for _ in 0..10 {
            match sim.step().unwrap() {
                StepEvent::Reversed { removed, .. } => assert!(removed.is_none()),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(sim.ledger().committed(), 0);
        assert_eq!(sim.ledger().tip(), GENESIS_HASH);
        assert_eq!(sim.state(), SimState::Running);
    }

    #[test]
    fn blocked_transactions_never_reach_the_chain() {
        let rules = every_currency(Always(Outcome::Blocked));
        let mut sim = Simulation::with_rules(config(1), rules, StdRng::seed_from_u64(3)).unwrap();
        for _ in 0..10 {
            assert!(matches!(sim.step().unwrap(), StepEvent::Blocked { .. }));
        }
        assert!(sim.ledger().chain().is_empty());
        sim.stop().unwrap();
        sim.validate().unwrap();
        assert_eq!(sim.finish().unwrap().blocked, 10);
    }

    #[test]
    fn suspicious_blocks_are_committed_and_flagged() {
        let rules = every_currency(Always(Outcome::Suspicious));
        let mut sim = Simulation::with_rules(config(3), rules, StdRng::seed_from_u64(4)).unwrap();
        let summary = sim.run_to_completion().unwrap();
        assert_eq!(summary.flagged, 3);
        assert_eq!(summary.committed, 3);
        assert!(summary.validation.is_valid());
    }

    #[test]
    fn mixed_reversals_keep_state_in_lockstep() {
        let rules = every_currency(Chance::new(40, Outcome::Reversed));
        let mut sim = Simulation::with_rules(config(12), rules, StdRng::seed_from_u64(5)).unwrap();
        let mut saw_removal = false;
        while sim.state() == SimState::Running {
            let before_tip = sim.ledger().tip().to_string();
            let event = sim.step().unwrap();
            let ledger = sim.ledger();
            assert_eq!(ledger.committed(), ledger.chain().len() as u64);
            assert_eq!(ledger.tip(), ledger.chain().tip_hash());
            match event {
                StepEvent::Reversed {
                    removed: Some(block),
                    ..
                } => {
                    saw_removal = true;
                    assert_eq!(block.hash, before_tip);
                    assert_eq!(ledger.tip(), block.previous_hash);
                }
                StepEvent::Committed { block, .. } => {
                    assert_eq!(block.previous_hash, before_tip);
                }
                _ => {}
            }
        }
        assert!(saw_removal);
        sim.validate().unwrap();
        let summary = sim.finish().unwrap();
        assert!(summary.validation.is_valid());
        assert_eq!(summary.chain_len, 12);
        assert!(summary.reversed > 0);
    }

    #[test]
    fn mining_exhaustion_leaves_ledger_untouched() {
        let cfg = SimConfig {
            difficulty: 6,
            max_attempts: 1,
            ..config(3)
        };
        let mut sim =
            Simulation::with_rules(cfg, RuleEngine::new(), StdRng::seed_from_u64(6)).unwrap();
        // A single attempt at six zero digits is a 1 in 16.7M shot.
        let err = sim.step().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MiningExhausted {
                attempts: 1,
                difficulty: 6
            }
        ));
        assert_eq!(sim.ledger().committed(), 0);
        assert!(sim.ledger().chain().is_empty());
    }

    #[test]
    fn stop_only_from_running() {
        let cfg = SimConfig {
            blocks: None,
            ..config(1)
        };
        let mut sim =
            Simulation::with_rules(cfg, RuleEngine::new(), StdRng::seed_from_u64(7)).unwrap();
        assert!(sim.finish().is_err());
        sim.step().unwrap();
        sim.stop().unwrap();
        assert!(sim.stop().is_err());
        assert!(sim.validate().unwrap().is_valid());
        assert_eq!(sim.finish().unwrap().committed, 1);
    }

    #[test]
    fn unbounded_run_cannot_complete_on_its_own() {
        let cfg = SimConfig {
            blocks: None,
            ..config(1)
        };
        let mut sim = Simulation::new(cfg, StdRng::seed_from_u64(8)).unwrap();
        assert!(sim.run_to_completion().is_err());
        assert_eq!(sim.state(), SimState::Running);
    }

    #[test]
    fn delay_stays_within_bounds() {
        let cfg = SimConfig {
            min_delay_ms: 100,
            max_delay_ms: 250,
            ..config(1)
        };
        let mut sim = Simulation::new(cfg, StdRng::seed_from_u64(9)).unwrap();
        for _ in 0..500 {
            let d = sim.next_delay();
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(250));
        }
    }
}
