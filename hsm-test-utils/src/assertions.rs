//! Domain assertion helpers: active-leaf sets, context paths, trace
//! containment. Each panics with a descriptive message on failure so a test
//! failure points straight at the mismatch.

use hsm_context::ContextManager;
use serde_json::Value as Json;

/// Assert the actor's active leaves are exactly `expected`, ignoring order.
#[track_caller]
pub fn assert_active_leaves(actual: &[String], expected: &[&str]) {
    let mut actual_sorted = actual.to_vec();
    actual_sorted.sort();
    let mut expected_sorted: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected_sorted.sort();
    assert_eq!(actual_sorted, expected_sorted, "active leaves mismatch: got {actual:?}, want {expected:?}");
}

/// Assert a single atomic state is active (the common non-parallel case).
#[track_caller]
pub fn assert_single_leaf(actual: &[String], expected: &str) {
    assert_active_leaves(actual, &[expected]);
}

/// Assert `context.get(path) == Some(expected)`.
#[track_caller]
pub fn assert_context_path(context: &ContextManager, path: &str, expected: &Json) {
    let actual = context.get(path);
    assert_eq!(actual, Some(expected), "context path {path:?} mismatch: got {actual:?}, want Some({expected:?})");
}

/// Assert `context.get(path)` is absent.
#[track_caller]
pub fn assert_context_missing(context: &ContextManager, path: &str) {
    assert!(context.get(path).is_none(), "expected context path {path:?} to be absent, found {:?}", context.get(path));
}

/// Assert the trace contains an entry matching `needle` as a substring
/// (trace entries are dotted strings like `"machine.state.leaf.enter"`,
/// built from `hsm_core::event::trace`'s formatters).
#[track_caller]
pub fn assert_trace_contains(trace: &[String], needle: &str) {
    assert!(
        trace.iter().any(|entry| entry.contains(needle)),
        "trace never contains {needle:?}: {trace:?}"
    );
}

/// Assert the trace's last entry matches `needle` as a substring.
#[track_caller]
pub fn assert_trace_ends_with(trace: &[String], needle: &str) {
    let last = trace.last().unwrap_or_else(|| panic!("trace is empty, expected final entry containing {needle:?}"));
    assert!(last.contains(needle), "trace ended with {last:?}, want something containing {needle:?}");
}
