//! Running tally of classified output lines.

use serde::{Deserialize, Serialize};

use crate::rule::RuleSet;
use crate::severity::Severity;

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineVerdict<'r> {
    /// Severity to emit the line at. `Ignore` means do not emit.
    pub severity: Severity,
    /// Explanation attached to the matching rule.
    pub explanation: Option<&'r str>,
    /// Whether any rule matched.
    pub matched: bool,
}

/// Aggregates classification results over one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTally {
    /// Highest severity among lines that matched a rule.
    pub worst_severity: Option<Severity>,
    /// Lines classified at `error` or above.
    pub num_errors: usize,
    /// Non-blank lines seen.
    pub lines: usize,
}

impl OutputTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one line and fold it into the tally.
    ///
    /// Blank lines (empty after trimming) are skipped and return `None`.
    pub fn observe<'r>(&mut self, rules: &'r RuleSet, line: &str) -> Option<LineVerdict<'r>> {
        if line.trim().is_empty() {
            return None;
        }
        self.lines += 1;

        let verdict = match rules.first_match(line) {
            Some(rule) => {
                self.worst_severity = Some(match self.worst_severity {
                    Some(worst) => worst.max(rule.level),
                    None => rule.level,
                });
                LineVerdict {
                    severity: rule.level,
                    explanation: rule.explanation.as_deref(),
                    matched: true,
                }
            }
            None => LineVerdict {
                severity: Severity::Info,
                explanation: None,
                matched: false,
            },
        };

        if verdict.severity.is_error() {
            self.num_errors += 1;
        }
        Some(verdict)
    }

    pub fn has_errors(&self) -> bool {
        self.num_errors > 0
    }
}
