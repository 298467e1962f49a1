//! Hidden rules keyed by source account or currency.
//!
//! Each rule is an independent, possibly random predicate. The engine looks
//! up the account rule first and the currency rule second; a non-`None`
//! currency result replaces whatever the account rule produced.

use rand::{Rng, RngCore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    #[default]
    None,
    Blocked,
    Suspicious,
    Reversed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::None => "NONE",
            Outcome::Blocked => "BLOCKED",
            Outcome::Suspicious => "SUSPICIOUS",
            Outcome::Reversed => "REVERSED",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Outcome::None)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Rule: Send + Sync {
    fn apply(&self, rng: &mut dyn RngCore) -> Outcome;

    /// Short human-readable form, e.g. `30% SUSPICIOUS`.
    fn describe(&self) -> String;
}

/// Fires on every evaluation.
#[derive(Clone, Copy, Debug)]
pub struct Always(pub Outcome);

impl Rule for Always {
    fn apply(&self, _rng: &mut dyn RngCore) -> Outcome {
        self.0
    }

    fn describe(&self) -> String {
        format!("always {}", self.0)
    }
}

/// Fires with `percent`% probability, otherwise yields `Outcome::None`.
#[derive(Clone, Copy, Debug)]
pub struct Chance {
    pub percent: u32,
    pub outcome: Outcome,
}

impl Chance {
    pub fn new(percent: u32, outcome: Outcome) -> Self {
        Self {
            percent: percent.min(100),
            outcome,
        }
    }
}

impl Rule for Chance {
    fn apply(&self, rng: &mut dyn RngCore) -> Outcome {
        if rng.gen_range(0..100) < self.percent {
            self.outcome
        } else {
            Outcome::None
        }
    }

    fn describe(&self) -> String {
        format!("{}% {}", self.percent, self.outcome)
    }
}

#[derive(Default)]
pub struct RuleEngine {
    account_rules: HashMap<String, Box<dyn Rule>>,
    currency_rules: HashMap<String, Box<dyn Rule>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule set the simulation runs with.
    pub fn hidden_rules() -> Self {
        Self::new()
            .with_account_rule("ACC7", Always(Outcome::Blocked))
            .with_account_rule("ACC3", Chance::new(20, Outcome::Reversed))
            .with_currency_rule("XMR", Chance::new(30, Outcome::Suspicious))
            .with_currency_rule("BTC", Chance::new(10, Outcome::Blocked))
    }

    pub fn with_account_rule(mut self, account: &str, rule: impl Rule + 'static) -> Self {
        self.account_rules.insert(account.to_string(), Box::new(rule));
        self
    }

    pub fn with_currency_rule(mut self, currency: &str, rule: impl Rule + 'static) -> Self {
        self.currency_rules.insert(currency.to_string(), Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.account_rules.len() + self.currency_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(key, description)` for every registered rule, accounts first.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut accounts: Vec<_> = self
            .account_rules
            .iter()
            .map(|(k, r)| (k.clone(), r.describe()))
            .collect();
        accounts.sort();
        let mut currencies: Vec<_> = self
            .currency_rules
            .iter()
            .map(|(k, r)| (k.clone(), r.describe()))
            .collect();
        currencies.sort();
        accounts.extend(currencies);
        accounts
    }

    pub fn evaluate(&self, source: &str, currency: &str, rng: &mut dyn RngCore) -> Outcome {
        let mut outcome = self
            .account_rules
            .get(source)
            .map(|rule| rule.apply(rng))
            .unwrap_or_default();
        if let Some(rule) = self.currency_rules.get(currency) {
            let result = rule.apply(rng);
            if !result.is_none() {
                outcome = result;
            }
        }
        outcome
    }
}
