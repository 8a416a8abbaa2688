//! Output classification rules for the releng lane.
//!
//! A [`RuleSet`] is an ordered list of [`ErrorRule`]s. Each line of command
//! output is matched top to bottom and takes the severity of the first rule
//! that matches; lines matching nothing are `info`. [`OutputTally`] folds
//! those verdicts into the worst severity seen and an error count.
//!
//! This crate does no I/O. Running commands and emitting lines is the
//! caller's business.

pub mod presets;
mod rule;
mod severity;
mod tally;

pub use rule::{ErrorRule, Pattern, RuleError, RuleSet};
pub use severity::Severity;
pub use tally::{LineVerdict, OutputTally};
