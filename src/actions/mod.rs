//! Action set resolution
//!
//! A script declares its full action vocabulary (`all`) and the subset it
//! runs by default. The actions for one invocation are resolved as:
//! 1. Start from the defaults (replaced by config `default_actions` if set)
//! 2. `actions` non-empty: replace the working list entirely
//! 3. Otherwise `add_actions`: append in insertion order
//! 4. Remove every entry named in `no_actions`
//!
//! Every name is validated against the vocabulary and the result never
//! contains duplicates.

use std::collections::HashSet;

use thiserror::Error;

/// Action vocabulary errors.
#[derive(Debug, Error, PartialEq)]
pub enum ActionError {
    #[error("invalid action(s): {}; valid actions: {}", .invalid.join(", "), .valid.join(", "))]
    Invalid {
        invalid: Vec<String>,
        valid: Vec<String>,
    },

    #[error("action '{0}' declared more than once")]
    Duplicate(String),

    #[error("no handler registered for action(s): {}", .0.join(", "))]
    MissingHandler(Vec<String>),
}

/// Command-line style filters applied on top of the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionFilters {
    pub actions: Vec<String>,
    pub add_actions: Vec<String>,
    pub no_actions: Vec<String>,
}

impl ActionFilters {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.add_actions.is_empty() && self.no_actions.is_empty()
    }
}

/// A script's action vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSet {
    all: Vec<String>,
    defaults: Vec<String>,
}

impl ActionSet {
    /// Declare the vocabulary. Names in `all` must be unique and `defaults`
    /// must be drawn from `all`.
    pub fn new<A, D>(all: A, defaults: D) -> Result<Self, ActionError>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let all: Vec<String> = all.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for name in &all {
            if !seen.insert(name.as_str()) {
                return Err(ActionError::Duplicate(name.clone()));
            }
        }

        let set = Self {
            all,
            defaults: Vec::new(),
        };
        let defaults: Vec<String> = defaults.into_iter().map(Into::into).collect();
        set.validate(&defaults)?;
        Ok(Self {
            defaults: dedup(defaults),
            ..set
        })
    }

    pub fn all(&self) -> &[String] {
        &self.all
    }

    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all.iter().any(|a| a == name)
    }

    /// Fail listing every name not in the vocabulary.
    pub fn validate<S: AsRef<str>>(&self, names: &[S]) -> Result<(), ActionError> {
        let mut invalid: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref();
            if !self.contains(name) && !invalid.iter().any(|i| i == name) {
                invalid.push(name.to_string());
            }
        }
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(ActionError::Invalid {
                invalid,
                valid: self.all.clone(),
            })
        }
    }

    /// Compute the ordered, deduplicated action list for one invocation.
    ///
    /// `config_defaults` replaces the script defaults when given. Pure:
    /// identical inputs always give identical output.
    pub fn resolve(
        &self,
        config_defaults: Option<&[String]>,
        filters: &ActionFilters,
    ) -> Result<Vec<String>, ActionError> {
        let defaults = match config_defaults {
            Some(list) => {
                self.validate(list)?;
                list
            }
            None => &self.defaults[..],
        };
        self.validate(&filters.actions)?;
        self.validate(&filters.add_actions)?;
        self.validate(&filters.no_actions)?;

        let mut working: Vec<String> = if !filters.actions.is_empty() {
            filters.actions.clone()
        } else {
            defaults
                .iter()
                .chain(filters.add_actions.iter())
                .cloned()
                .collect()
        };
        working.retain(|name| !filters.no_actions.contains(name));
        Ok(dedup(working))
    }

    /// Human-readable vocabulary listing. Defaults are shown only when they
    /// differ from the full list.
    pub fn listing(&self, config_defaults: Option<&[String]>) -> String {
        let defaults = config_defaults.unwrap_or(&self.defaults);
        let mut out = String::from("Actions available:\n");
        out.push_str(&format!("  {}\n", self.all.join(", ")));
        if defaults != &self.all[..] {
            out.push_str("Default actions:\n");
            out.push_str(&format!("  {}\n", defaults.join(", ")));
        }
        out
    }

    /// Print the listing and exit 0.
    pub fn list_actions(&self, config_defaults: Option<&[String]>) -> ! {
        print!("{}", self.listing(config_defaults));
        std::process::exit(crate::error::EXIT_SUCCESS);
    }
}

/// Drop repeated names, keeping first occurrences in order.
fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
