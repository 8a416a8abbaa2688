//! Action Resolution Tests
//!
//! The resolved action list for the standard script vocabulary under
//! combinations of config defaults and command-line filters.

use releng_lane::script::{action_set, ALL_ACTIONS, DEFAULT_ACTIONS};
use releng_lane::{ActionError, ActionFilters, ActionSet};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn filters(actions: &[&str], add: &[&str], no: &[&str]) -> ActionFilters {
    ActionFilters {
        actions: names(actions),
        add_actions: names(add),
        no_actions: names(no),
    }
}

// =============================================================================
// Test 1: the four resolution rules
// =============================================================================

#[test]
fn test_replace_add_subtract() {
    let set = ActionSet::new(["a", "b", "c", "d"], ["a", "b"]).unwrap();

    assert_eq!(set.resolve(None, &filters(&["c"], &[], &[])).unwrap(), names(&["c"]));
    assert_eq!(set.resolve(None, &filters(&[], &["c"], &[])).unwrap(), names(&["a", "b", "c"]));
    assert_eq!(set.resolve(None, &filters(&[], &[], &["b"])).unwrap(), names(&["a"]));
}

#[test]
fn test_invalid_name_reports_both_lists() {
    let set = ActionSet::new(["a", "b", "c", "d"], ["a", "b"]).unwrap();
    let err = set.resolve(None, &filters(&["z", "a", "y"], &[], &[])).unwrap_err();
    match err {
        ActionError::Invalid { invalid, valid } => {
            assert_eq!(invalid, names(&["z", "y"]));
            assert_eq!(valid, names(&["a", "b", "c", "d"]));
        }
        other => panic!("unexpected error: {}", other),
    }
}

// =============================================================================
// Test 2: standard script vocabulary
// =============================================================================

#[test]
fn test_standard_defaults_skip_clobber() {
    let set = action_set().unwrap();
    let resolved = set.resolve(None, &ActionFilters::default()).unwrap();
    assert_eq!(resolved, names(DEFAULT_ACTIONS));
    assert_eq!(set.all(), &names(ALL_ACTIONS)[..]);
}

#[test]
fn test_config_defaults_then_filters() {
    let set = action_set().unwrap();
    let config_defaults = names(&["clobber", "pull", "build", "package", "upload"]);
    let resolved = set
        .resolve(Some(&config_defaults), &filters(&[], &["run-tests"], &["upload", "clobber"]))
        .unwrap();
    assert_eq!(resolved, names(&["pull", "build", "package", "run-tests"]));
}

#[test]
fn test_duplicates_across_filters_collapse() {
    let set = action_set().unwrap();
    let resolved = set
        .resolve(None, &filters(&["build", "package", "build"], &["build"], &[]))
        .unwrap();
    assert_eq!(resolved, names(&["build", "package"]));
}

#[test]
fn test_resolution_is_repeatable() {
    let set = action_set().unwrap();
    let f = filters(&[], &["clobber"], &["pull"]);
    let first = set.resolve(None, &f).unwrap();
    for _ in 0..3 {
        assert_eq!(set.resolve(None, &f).unwrap(), first);
    }
}
