//! Console rendering of simulation events. Text mode is the line protocol
//! people read; JSON mode emits one object per line for scripts.

use ledger_core::{short_hash, Block, SimConfig, StepEvent, Summary, Transaction};
use serde::Serialize;

const SHORT_HASH: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonLine<'a> {
    Start {
        config: &'a SimConfig,
    },
    Committed {
        count: u64,
        bound: Option<u64>,
        flagged: bool,
        block: &'a Block,
    },
    Blocked {
        tx: &'a Transaction,
    },
    Reversed {
        tx: &'a Transaction,
        removed: Option<&'a Block>,
    },
    Summary(&'a Summary),
}

pub struct Reporter {
    format: Format,
}

impl Reporter {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    pub fn start(&self, config: &SimConfig) -> Vec<String> {
        match self.format {
            Format::Json => json(&JsonLine::Start { config }),
            Format::Text => {
                let bound = config
                    .blocks
                    .map(|b| format!("{b} blocks"))
                    .unwrap_or_else(|| "until interrupted (Ctrl-C)".to_string());
                vec![format!(
                    "Mining {bound} at difficulty {}, pausing {}-{}ms between blocks",
                    config.difficulty, config.min_delay_ms, config.max_delay_ms
                )]
            }
        }
    }

    pub fn event(&self, event: &StepEvent, bound: Option<u64>) -> Vec<String> {
        match self.format {
            Format::Json => json(&match event {
                StepEvent::Committed {
                    block,
                    flagged,
                    count,
                } => JsonLine::Committed {
                    count: *count,
                    bound,
                    flagged: *flagged,
                    block,
                },
                StepEvent::Blocked { tx } => JsonLine::Blocked { tx },
                StepEvent::Reversed { tx, removed } => JsonLine::Reversed {
                    tx,
                    removed: removed.as_ref(),
                },
            }),
            Format::Text => text_event(event, bound),
        }
    }

    pub fn summary(&self, summary: &Summary) -> Vec<String> {
        match self.format {
            Format::Json => json(&JsonLine::Summary(summary)),
            Format::Text => vec![
                String::new(),
                format!("Validation: {}", summary.validation),
                format!("Committed blocks: {}", summary.committed),
                format!("Chain length: {}", summary.chain_len),
                format!("Tip: {}", abbreviate(&summary.tip)),
                format!(
                    "Blocked: {}  Reversed: {}  Flagged: {}",
                    summary.blocked, summary.reversed, summary.flagged
                ),
            ],
        }
    }
}

fn text_event(event: &StepEvent, bound: Option<u64>) -> Vec<String> {
    match event {
        StepEvent::Committed {
            block,
            flagged,
            count,
        } => {
            let progress = match bound {
                Some(bound) => format!("{count}/{bound}"),
                None => count.to_string(),
            };
            let mut lines = vec![
                format!("Block {progress}"),
                format!("  Timestamp: {}", block.timestamp),
                format!("  Payload:   {}", block.payload),
                format!("  Nonce:     {}", block.nonce),
                format!("  Hash:      {}", block.hash),
            ];
            if *flagged {
                lines.push("  [FLAG] Suspicious transaction committed for review".to_string());
            }
            lines
        }
        StepEvent::Blocked { tx } => vec![format!(
            "[RULE] Blocked {} {}->{} {} {}; no block created",
            tx.category, tx.from, tx.to, tx.amount, tx.currency
        )],
        StepEvent::Reversed {
            removed: Some(block),
            ..
        } => vec![format!(
            "[RULE] Reversed block {}; tip reverted to {}",
            abbreviate(&block.hash),
            abbreviate(&block.previous_hash)
        )],
        StepEvent::Reversed { removed: None, .. } => {
            vec!["[RULE] Reversal requested on an empty chain; nothing to reverse".to_string()]
        }
    }
}

/// Hash prefix with a trailing ellipsis; short values like the genesis
/// sentinel pass through whole.
fn abbreviate(hash: &str) -> String {
    let prefix = short_hash(hash, SHORT_HASH);
    if prefix.len() < hash.len() {
        format!("{prefix}...")
    } else {
        prefix.to_string()
    }
}

fn json<T: Serialize>(line: &T) -> Vec<String> {
    match serde_json::to_string(line) {
        Ok(s) => vec![s],
        Err(e) => {
            tracing::error!("failed to encode report line: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{Category, Validation};

    fn tx() -> Transaction {
        Transaction {
            timestamp: "2024-01-01 00:00:00".to_string(),
            category: Category::Exchange,
            from: "ACC2".to_string(),
            to: "ACC5".to_string(),
            amount: 500,
            currency: "XMR".to_string(),
        }
    }

    fn block() -> Block {
        Block::mine(&tx(), "GENESIS", 1, 1_000_000).unwrap()
    }

    #[test]
    fn committed_block_lines() {
        let event = StepEvent::Committed {
            block: block(),
            flagged: true,
            count: 3,
        };
        let lines = Reporter::new(Format::Text).event(&event, Some(10));
        assert_eq!(lines[0], "Block 3/10");
        assert!(lines[2].contains("PrevHash: GENESIS"));
        assert!(lines.last().unwrap().contains("[FLAG]"));

        let unbounded = Reporter::new(Format::Text).event(&event, None);
        assert_eq!(unbounded[0], "Block 3");
    }

    #[test]
    fn rule_lines_are_prefixed() {
        let reporter = Reporter::new(Format::Text);
        let blocked = reporter.event(&StepEvent::Blocked { tx: tx() }, None);
        assert_eq!(blocked.len(), 1);
        assert!(blocked[0].starts_with("[RULE] Blocked EXCHANGE ACC2->ACC5"));

        let reversed = reporter.event(
            &StepEvent::Reversed {
                tx: tx(),
                removed: Some(block()),
            },
            None,
        );
        let expected = format!("[RULE] Reversed block {}...", &block().hash[..16]);
        assert!(reversed[0].starts_with(&expected));
        assert!(reversed[0].ends_with("tip reverted to GENESIS"));

        let noop = reporter.event(
            &StepEvent::Reversed {
                tx: tx(),
                removed: None,
            },
            None,
        );
        assert!(noop[0].contains("nothing to reverse"));
    }

    #[test]
    fn summary_lines() {
        let summary = Summary {
            validation: Validation::Valid,
            committed: 2,
            chain_len: 2,
            tip: "0".repeat(64),
            blocked: 1,
            reversed: 0,
            flagged: 1,
        };
        let lines = Reporter::new(Format::Text).summary(&summary);
        assert!(lines.contains(&"Validation: PASSED".to_string()));
        assert!(lines.contains(&"Chain length: 2".to_string()));
        assert!(lines.contains(&format!("Tip: {}...", "0".repeat(16))));

        let empty = Summary {
            committed: 0,
            chain_len: 0,
            tip: "GENESIS".to_string(),
            ..summary
        };
        let lines = Reporter::new(Format::Text).summary(&empty);
        assert!(lines.contains(&"Tip: GENESIS".to_string()));
    }

    #[test]
    fn json_lines_are_tagged() {
        let reporter = Reporter::new(Format::Json);
        let lines = reporter.event(
            &StepEvent::Committed {
                block: block(),
                flagged: false,
                count: 1,
            },
            Some(5),
        );
        let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(value["event"], "committed");
        assert_eq!(value["bound"], 5);
        assert_eq!(value["block"]["previous_hash"], "GENESIS");

        let start = reporter.start(&SimConfig::default());
        let value: serde_json::Value = serde_json::from_str(&start[0]).unwrap();
        assert_eq!(value["event"], "start");
        assert!(value["config"]["blocks"].is_null());
    }
}
