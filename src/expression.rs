//! The rule expression language.
//!
//! Expressions are tokenized once and then checked by a single incremental
//! state machine, whichever grammar profile applies. The formatter converts
//! between the stored one-line form and an annotated multi-line form.

/// Splitting text into tokens.
pub mod token;
pub use token::{Keyword, LexError, Token, render, tokenize};

pub mod tuning;
pub use tuning::TuningAction;

mod validator;
pub use validator::{FeatureExpansion, Profile, Reason, Session, Validator, Violation};

mod formatter;
pub use formatter::{FormatError, Formatter, VerticalStyle, to_horizontal};
