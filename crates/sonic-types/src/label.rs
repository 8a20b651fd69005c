//! MPLS label stack as it appears in next-hop keys.
//!
//! Grammar: an optional `swap` or `push` operation prefix followed by one or
//! more decimal labels separated by `/`, e.g. `100/200` or `push100/200`.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between labels in a stack.
pub const LABEL_DELIMITER: char = '/';

/// Largest value an MPLS label can carry (20 bits).
pub const MAX_LABEL: u32 = (1 << 20) - 1;

/// MPLS out-segment operation applied by a labeled next hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MplsOp {
    Swap,
    Push,
}

impl MplsOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MplsOp::Swap => "swap",
            MplsOp::Push => "push",
        }
    }
}

/// An ordered MPLS label stack with an optional operation.
///
/// The empty stack means "unlabeled".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelStack {
    op: Option<MplsOp>,
    labels: Vec<u32>,
}

impl LabelStack {
    pub fn new(op: Option<MplsOp>, labels: Vec<u32>) -> Result<Self, ParseError> {
        if let Some(&bad) = labels.iter().find(|&&l| l > MAX_LABEL) {
            return Err(ParseError::InvalidLabel(bad.to_string()));
        }
        Ok(Self { op, labels })
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn op(&self) -> Option<MplsOp> {
        self.op
    }
}

impl fmt::Display for LabelStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = self.op {
            f.write_str(op.as_str())?;
        }
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", LABEL_DELIMITER)?;
            }
            write!(f, "{}", label)?;
        }
        Ok(())
    }
}

impl FromStr for LabelStack {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (op, rest) = if let Some(rest) = s.strip_prefix(MplsOp::Swap.as_str()) {
            (Some(MplsOp::Swap), rest)
        } else if let Some(rest) = s.strip_prefix(MplsOp::Push.as_str()) {
            (Some(MplsOp::Push), rest)
        } else {
            (None, s)
        };

        if rest.is_empty() {
            return Err(ParseError::InvalidLabel(s.to_string()));
        }

        let labels = rest
            .split(LABEL_DELIMITER)
            .map(|tok| {
                tok.trim()
                    .parse::<u32>()
                    .map_err(|_| ParseError::InvalidLabel(tok.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        LabelStack::new(op, labels)
    }
}
