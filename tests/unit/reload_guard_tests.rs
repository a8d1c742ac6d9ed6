//! Unit tests for reload coalescing.

use procwarden::supervisor::{ReloadGuard, ReloadStatus};

#[test]
fn idle_request_starts_a_cycle() {
    let mut guard = ReloadGuard::new();
    assert_eq!(guard.status(), ReloadStatus::Idle);

    assert!(guard.request());
    assert_eq!(guard.status(), ReloadStatus::Running);
}

#[test]
fn requests_during_a_cycle_coalesce() {
    let mut guard = ReloadGuard::new();
    assert!(guard.request());

    assert!(!guard.request());
    assert_eq!(guard.status(), ReloadStatus::Pending);
    assert!(!guard.request());
    assert_eq!(guard.status(), ReloadStatus::Pending);
}

#[test]
fn settle_without_pending_goes_idle() {
    let mut guard = ReloadGuard::new();
    assert!(guard.request());

    assert!(!guard.settle());
    assert_eq!(guard.status(), ReloadStatus::Idle);
}

#[test]
fn settle_with_pending_runs_one_follow_up() {
    let mut guard = ReloadGuard::new();
    assert!(guard.request());
    assert!(!guard.request());

    assert!(guard.settle());
    assert_eq!(guard.status(), ReloadStatus::Running);

    assert!(!guard.settle());
    assert_eq!(guard.status(), ReloadStatus::Idle);
}

#[test]
fn n_requests_in_flight_cost_exactly_one_extra_cycle() {
    let mut guard = ReloadGuard::new();
    let mut cycles = 0;

    if guard.request() {
        cycles += 1;
    }
    for _ in 0..10 {
        if guard.request() {
            cycles += 1;
        }
    }
    while guard.settle() {
        cycles += 1;
    }

    assert_eq!(cycles, 2);
    assert_eq!(guard.status(), ReloadStatus::Idle);
}

#[test]
fn reset_drops_pending_work() {
    let mut guard = ReloadGuard::new();
    assert!(guard.request());
    assert!(!guard.request());

    guard.reset();
    assert_eq!(guard.status(), ReloadStatus::Idle);
    assert!(!guard.settle());
}
