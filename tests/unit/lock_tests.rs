//! Unit tests for the project exclusivity lock.
//!
//! Two `ProjectLock` instances against the same lock file stand in for two
//! processes: flock conflicts apply across independent file handles even
//! within one process.

use std::path::PathBuf;

use procwarden::lock::ProjectLock;

fn lock_path() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(".procwarden.lock");
    (dir, path)
}

#[test]
fn first_acquisition_wins() {
    let (_dir, path) = lock_path();
    let mut lock = ProjectLock::new(&path);

    assert!(lock.acquire_exclusive().expect("acquire"));
    assert!(lock.is_owner());
}

#[test]
fn second_acquisition_loses() {
    let (_dir, path) = lock_path();
    let mut owner = ProjectLock::new(&path);
    let mut challenger = ProjectLock::new(&path);

    assert!(owner.acquire_exclusive().expect("acquire"));
    assert!(!challenger.acquire_exclusive().expect("acquire attempt"));
    assert!(!challenger.is_owner());
}

#[test]
fn acquisition_is_reentrant_for_the_owner() {
    let (_dir, path) = lock_path();
    let mut owner = ProjectLock::new(&path);

    assert!(owner.acquire_exclusive().expect("acquire"));
    assert!(owner.acquire_exclusive().expect("re-acquire"));
}

#[test]
fn owner_probe_short_circuits() {
    let (_dir, path) = lock_path();
    let mut owner = ProjectLock::new(&path);

    assert!(owner.acquire_exclusive().expect("acquire"));
    // The owner must report "locked" without re-touching its own file.
    assert!(owner.is_locked().expect("probe"));
}

#[test]
fn stranger_probe_sees_exclusive_holder() {
    let (_dir, path) = lock_path();
    let mut owner = ProjectLock::new(&path);
    let probe = ProjectLock::new(&path);

    assert!(!probe.is_locked().expect("probe before acquire"));
    assert!(owner.acquire_exclusive().expect("acquire"));
    assert!(probe.is_locked().expect("probe while held"));
}

#[test]
fn probe_leaves_no_residue() {
    let (_dir, path) = lock_path();
    let probe = ProjectLock::new(&path);
    assert!(!probe.is_locked().expect("probe"));

    // The shared probe must have been released: exclusive acquisition
    // still succeeds afterwards.
    let mut owner = ProjectLock::new(&path);
    assert!(owner.acquire_exclusive().expect("acquire after probe"));
}

#[test]
fn release_frees_the_key() {
    let (_dir, path) = lock_path();
    let mut first = ProjectLock::new(&path);
    let mut second = ProjectLock::new(&path);

    assert!(first.acquire_exclusive().expect("acquire"));
    first.release();
    assert!(!first.is_owner());

    assert!(!second.is_locked().expect("probe after release"));
    assert!(second.acquire_exclusive().expect("acquire after release"));
}

#[test]
fn drop_releases_ownership() {
    let (_dir, path) = lock_path();
    {
        let mut owner = ProjectLock::new(&path);
        assert!(owner.acquire_exclusive().expect("acquire"));
    }
    let mut successor = ProjectLock::new(&path);
    assert!(successor.acquire_exclusive().expect("acquire after drop"));
}
