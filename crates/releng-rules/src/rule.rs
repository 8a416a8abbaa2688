//! Error rules and ordered rule sets.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Errors raised while building rules.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("rule must set exactly one of 'substr' or 'regex'")]
    AmbiguousPattern,

    #[error("unknown error list: {0}")]
    UnknownPreset(String),
}

/// What a rule looks for in a line.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Literal substring anywhere in the line.
    Substring(String),
    /// Regular expression searched anywhere in the line.
    Regex(Regex),
}

impl Pattern {
    /// Literal substring pattern.
    pub fn substring(text: impl Into<String>) -> Self {
        Pattern::Substring(text.into())
    }

    /// Compile a regex pattern.
    pub fn regex(pattern: &str) -> Result<Self, RuleError> {
        Regex::new(pattern)
            .map(Pattern::Regex)
            .map_err(|e| RuleError::InvalidRegex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }

    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Pattern::Substring(text) => line.contains(text.as_str()),
            Pattern::Regex(re) => re.is_match(line),
        }
    }

    /// Source text of the pattern.
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Substring(text) => text,
            Pattern::Regex(re) => re.as_str(),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Pattern::Substring(a), Pattern::Substring(b)) => a == b,
            (Pattern::Regex(a), Pattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// A pattern paired with the severity it assigns.
///
/// Serialized form: `{"substr": "...", "level": "error", "explanation": "..."}`
/// or the same with `"regex"` in place of `"substr"`. `level` defaults to
/// `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct ErrorRule {
    pub pattern: Pattern,
    pub level: Severity,
    pub explanation: Option<String>,
}

impl ErrorRule {
    pub fn new(pattern: Pattern, level: Severity) -> Self {
        Self {
            pattern,
            level,
            explanation: None,
        }
    }

    /// Substring rule.
    pub fn substr(text: impl Into<String>, level: Severity) -> Self {
        Self::new(Pattern::substring(text), level)
    }

    /// Regex rule.
    pub fn regex(pattern: &str, level: Severity) -> Result<Self, RuleError> {
        Ok(Self::new(Pattern::regex(pattern)?, level))
    }

    /// Attach explanatory text emitted after a matching line.
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    substr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regex: Option<String>,
    #[serde(default = "default_rule_level")]
    level: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
}

fn default_rule_level() -> Severity {
    Severity::Error
}

impl TryFrom<RawRule> for ErrorRule {
    type Error = RuleError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let pattern = match (raw.substr, raw.regex) {
            (Some(text), None) => Pattern::Substring(text),
            (None, Some(re)) => Pattern::regex(&re)?,
            _ => return Err(RuleError::AmbiguousPattern),
        };
        Ok(Self {
            pattern,
            level: raw.level,
            explanation: raw.explanation,
        })
    }
}

impl From<ErrorRule> for RawRule {
    fn from(rule: ErrorRule) -> Self {
        let (substr, regex) = match rule.pattern {
            Pattern::Substring(text) => (Some(text), None),
            Pattern::Regex(re) => (None, Some(re.as_str().to_string())),
        };
        Self {
            substr,
            regex,
            level: rule.level,
            explanation: rule.explanation,
        }
    }
}

/// Ordered list of rules evaluated top to bottom, first match wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<ErrorRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ErrorRule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Append another set; its rules are consulted after the existing ones.
    pub fn extend(&mut self, other: RuleSet) {
        self.rules.extend(other.rules);
    }

    pub fn push(&mut self, rule: ErrorRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ErrorRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule matching `line`, if any.
    pub fn first_match(&self, line: &str) -> Option<&ErrorRule> {
        self.rules.iter().find(|rule| rule.is_match(line))
    }

    /// Severity for `line`: the first matching rule's level, else `Info`.
    pub fn severity_for(&self, line: &str) -> Severity {
        self.first_match(line)
            .map(|rule| rule.level)
            .unwrap_or(Severity::Info)
    }
}

impl FromIterator<ErrorRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = ErrorRule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
