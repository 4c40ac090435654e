// * Increment Commands
// * Counter mutations produced by the aggregators and applied by the writer

use std::fmt;

use crate::ingest::PageClassification;

/// Which tally a command feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    Pv,
    Uv,
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Pv => "pv",
            CounterKind::Uv => "uv",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation applied to each ranked counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOp {
    /// Add N to the member's score (`ZINCRBY key N member`)
    ScoreBy(i64),
}

impl IncrementOp {
    pub fn command_name(&self) -> &'static str {
        match self {
            IncrementOp::ScoreBy(_) => "ZINCRBY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementCommand {
    pub kind: CounterKind,
    pub op: IncrementOp,
    pub page: PageClassification,
}

impl IncrementCommand {
    /// Single-step increment for one visit
    pub fn unit(kind: CounterKind, page: PageClassification) -> Self {
        Self {
            kind,
            op: IncrementOp::ScoreBy(1),
            page,
        }
    }
}
