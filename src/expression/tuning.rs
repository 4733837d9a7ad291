//! Tuning micro-operations.
//!
//! A tuning action is the right side of a static-style dynamic rule. It has
//! one of four fixed shapes:
//!
//! - `ON <n> ADD <n>`
//! - `FROM <n> DELETE <n>`
//! - `CHANGE QUANTITY OF <code> TO <n>`
//! - `CHANGE PRICE <+n|-n>`
//!
//! Words are case-insensitive.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::expression::{Reason, Token};

const STARTERS: [&str; 3] = ["ON", "FROM", "CHANGE"];

const WORDS: [&str; 9] = [
    "ON", "ADD", "FROM", "DELETE", "CHANGE", "QUANTITY", "OF", "TO", "PRICE",
];

/// Whether `word` is one of the reserved tuning words.
#[must_use]
pub fn is_tuning_word(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    WORDS.contains(&upper.as_str())
}

/// Whether `word` can open a tuning action.
#[must_use]
pub fn is_tuning_starter(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    STARTERS.contains(&upper.as_str())
}

/// Whether `action` reads as a tuning action, judged by its first word.
#[must_use]
pub fn is_tuning_action(action: &str) -> bool {
    action.split_whitespace().next().is_some_and(is_tuning_starter)
}

/// A parsed tuning action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TuningAction {
    /// `ON <on> ADD <add>`
    OnAdd {
        /// Trigger quantity.
        on: u32,
        /// Quantity added.
        add: u32,
    },
    /// `FROM <from> DELETE <delete>`
    FromDelete {
        /// Trigger quantity.
        from: u32,
        /// Quantity removed.
        delete: u32,
    },
    /// `CHANGE QUANTITY OF <code> TO <to>`
    ChangeQuantity {
        /// The option or BOM code whose quantity changes.
        code: String,
        /// The new quantity.
        to: u32,
    },
    /// `CHANGE PRICE <delta>`
    ChangePrice {
        /// Signed price adjustment.
        delta: i64,
    },
}

impl FromStr for TuningAction {
    type Err = Reason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<String> = s.split_whitespace().map(str::to_string).collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

        match upper.as_slice() {
            ["ON", on, "ADD", add] => Ok(Self::OnAdd {
                on: quantity(on)?,
                add: quantity(add)?,
            }),
            ["FROM", from, "DELETE", delete] => Ok(Self::FromDelete {
                from: quantity(from)?,
                delete: quantity(delete)?,
            }),
            ["CHANGE", "QUANTITY", "OF", _, "TO", to] => Ok(Self::ChangeQuantity {
                code: words[3].clone(),
                to: quantity(to)?,
            }),
            ["CHANGE", "PRICE", delta] => Ok(Self::ChangePrice {
                delta: price(delta)?,
            }),
            [] => Err(Reason::EmptyExpression),
            _ => Err(Reason::InvalidTuning),
        }
    }
}

impl fmt::Display for TuningAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnAdd { on, add } => write!(f, "ON {on} ADD {add}"),
            Self::FromDelete { from, delete } => write!(f, "FROM {from} DELETE {delete}"),
            Self::ChangeQuantity { code, to } => write!(f, "CHANGE QUANTITY OF {code} TO {to}"),
            Self::ChangePrice { delta } => write!(f, "CHANGE PRICE {delta:+}"),
        }
    }
}

fn quantity(word: &str) -> Result<u32, Reason> {
    if !word.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Reason::InvalidQuantity);
    }
    word.parse().map_err(|_| Reason::InvalidQuantity)
}

fn price(word: &str) -> Result<i64, Reason> {
    let (sign, digits) = match word.split_at_checked(1) {
        Some(("+", digits)) => (1, digits),
        Some(("-", digits)) => (-1, digits),
        _ => return Err(Reason::InvalidPrice),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Reason::InvalidPrice);
    }
    digits
        .parse::<i64>()
        .map(|n| sign * n)
        .map_err(|_| Reason::InvalidPrice)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    OnQuantity,
    ExpectAdd,
    AddQuantity,
    FromQuantity,
    ExpectDelete,
    DeleteQuantity,
    Change,
    ExpectOf,
    QuantityCode,
    ExpectTo,
    ToQuantity,
    PriceDelta,
    Done,
}

/// Incremental recogniser for one tuning action.
#[derive(Debug, Clone)]
pub struct TuningMachine {
    stage: Stage,
}

impl Default for TuningMachine {
    fn default() -> Self {
        Self {
            stage: Stage::Start,
        }
    }
}

impl TuningMachine {
    /// Whether the next token must be the code in `CHANGE QUANTITY OF`.
    #[must_use]
    pub fn expects_code(&self) -> bool {
        self.stage == Stage::QuantityCode
    }

    /// Whether a complete action has been recognised.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Advance by one token.
    ///
    /// # Errors
    ///
    /// Returns the reason the token cannot continue the action.
    pub fn feed(&mut self, token: &Token) -> Result<(), Reason> {
        if self.stage == Stage::Done {
            return Err(Reason::TrailingTokens);
        }
        let Some(word) = token.as_word() else {
            return Err(match self.stage {
                Stage::PriceDelta => Reason::InvalidPrice,
                Stage::OnQuantity
                | Stage::AddQuantity
                | Stage::FromQuantity
                | Stage::DeleteQuantity
                | Stage::ToQuantity => Reason::InvalidQuantity,
                _ => Reason::InvalidTuning,
            });
        };
        let upper = word.to_ascii_uppercase();

        self.stage = match (self.stage, upper.as_str()) {
            (Stage::Start, "ON") => Stage::OnQuantity,
            (Stage::Start, "FROM") => Stage::FromQuantity,
            (Stage::Start, "CHANGE") => Stage::Change,
            (Stage::OnQuantity, n) => {
                quantity(n)?;
                Stage::ExpectAdd
            }
            (Stage::ExpectAdd, "ADD") => Stage::AddQuantity,
            (Stage::FromQuantity, n) => {
                quantity(n)?;
                Stage::ExpectDelete
            }
            (Stage::ExpectDelete, "DELETE") => Stage::DeleteQuantity,
            (Stage::Change, "QUANTITY") => Stage::ExpectOf,
            (Stage::Change, "PRICE") => Stage::PriceDelta,
            (Stage::ExpectOf, "OF") => Stage::QuantityCode,
            (Stage::QuantityCode, _) => Stage::ExpectTo,
            (Stage::ExpectTo, "TO") => Stage::ToQuantity,
            (Stage::AddQuantity | Stage::DeleteQuantity | Stage::ToQuantity, n) => {
                quantity(n)?;
                Stage::Done
            }
            (Stage::PriceDelta, delta) => {
                price(delta)?;
                Stage::Done
            }
            _ => return Err(Reason::InvalidTuning),
        };
        Ok(())
    }

    /// Check that the action is complete.
    ///
    /// # Errors
    ///
    /// Returns [`Reason::IncompleteTuning`] if more words are required.
    pub fn finish(&self) -> Result<(), Reason> {
        match self.stage {
            Stage::Done => Ok(()),
            Stage::Start => Err(Reason::EmptyExpression),
            _ => Err(Reason::IncompleteTuning),
        }
    }
}
