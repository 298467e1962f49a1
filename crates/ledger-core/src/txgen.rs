use crate::{timestamp_now, Category, Transaction};
use rand::Rng;

pub const ACCOUNTS: [&str; 10] = [
    "ACC1", "ACC2", "ACC3", "ACC4", "ACC5", "ACC6", "ACC7", "ACC8", "ACC9", "ACC10",
];
pub const CURRENCIES: [&str; 6] = ["USD", "EUR", "GBP", "JPY", "BTC", "XMR"];
pub const AMOUNTS: [u64; 7] = [10, 25, 50, 100, 250, 500, 1000];

/// Synthetic transaction source driven by a Markov chain over [`Category`].
#[derive(Clone, Debug)]
pub struct TxGenerator {
    state: Category,
}

impl Default for TxGenerator {
    fn default() -> Self {
        Self::new(Category::Deposit)
    }
}

impl TxGenerator {
    pub fn new(initial: Category) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> Category {
        self.state
    }

    /// Step the category chain to one of the current state's successors.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Category {
        let next = self.state.successors();
        self.state = next[rng.gen_range(0..next.len())];
        self.state
    }

    pub fn next_tx<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Transaction {
        let category = self.advance(rng);
        let (from, to) = sample_pair(rng);
        Transaction {
            timestamp: timestamp_now(),
            category,
            from: from.to_string(),
            to: to.to_string(),
            amount: pick(&AMOUNTS, rng),
            currency: pick(&CURRENCIES, rng).to_string(),
        }
    }
}

/// Source and destination accounts. The destination is redrawn until it
/// differs from the source.
pub fn sample_pair<R: Rng + ?Sized>(rng: &mut R) -> (&'static str, &'static str) {
    let from = pick(&ACCOUNTS, rng);
    let mut to = pick(&ACCOUNTS, rng);
    while to == from {
        to = pick(&ACCOUNTS, rng);
    }
    (from, to)
}

fn pick<T: Copy, R: Rng + ?Sized>(pool: &[T], rng: &mut R) -> T {
    pool[rng.gen_range(0..pool.len())]
}
