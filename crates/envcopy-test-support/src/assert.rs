//! Assertions over recorded call logs.

use crate::mocks::{Call, FakeCloud};

/// Panic when the cloud saw any state-mutating call.
///
/// # Panics
///
/// Panics listing the destructive calls.
pub fn assert_no_destructive_calls(cloud: &FakeCloud) {
    let destructive = cloud.destructive_calls();
    assert!(
        destructive.is_empty(),
        "expected no destructive calls, got {destructive:#?}"
    );
}

/// Position of the first call matching `predicate`.
#[must_use]
pub fn position(calls: &[Call], predicate: impl Fn(&Call) -> bool) -> Option<usize> {
    calls.iter().position(predicate)
}

/// Panic unless a call matching `first` precedes every call matching `second`.
///
/// # Panics
///
/// Panics when either call is missing or the order is reversed.
pub fn assert_called_before(
    cloud: &FakeCloud,
    first: impl Fn(&Call) -> bool,
    second: impl Fn(&Call) -> bool,
) {
    let calls = cloud.calls();
    let first_at = position(&calls, first);
    let second_at = position(&calls, second);
    match (first_at, second_at) {
        (Some(a), Some(b)) => assert!(a < b, "expected call #{a} before call #{b}"),
        other => panic!("expected both calls to occur, got positions {other:?}"),
    }
}
