//! Recipient resolution scenarios and invariants.

use hm_core::directory::{KeyField, MemoryDirectory, User};
use hm_core::resolve::{resolve, ProcessDetail, UnknownUser};
use hm_core::snapshot::{ProcessRecord, ProcessSnapshot};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn user(uid: u32, name: &str) -> User {
    User::new(uid, name, None, None, vec![format!("{name}@hpc.site")]).unwrap()
}

fn directory(names: &[&str]) -> MemoryDirectory {
    let users = names
        .iter()
        .enumerate()
        .map(|(i, n)| user(1000 + i as u32, n))
        .collect();
    MemoryDirectory::new(users, KeyField::Username).unwrap()
}

fn scenario_snapshot() -> ProcessSnapshot {
    ProcessSnapshot::new(
        "node17",
        vec![
            ProcessRecord::new(100, "alice", vec!["sleep".into(), "60".into()]),
            ProcessRecord::new(101, "bob", vec!["vi".into(), "x".into()]),
        ],
    )
}

fn usernames(recipients: &[hm_core::Recipient]) -> Vec<String> {
    recipients.iter().map(|r| r.user.username.clone()).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_snapshot_owners_minus_root() {
    let dir = directory(&["alice", "bob", "carol"]);
    let res = resolve(Some(&scenario_snapshot()), &dir, &[], "root", ProcessDetail::Omit);
    assert_eq!(usernames(&res.recipients), ["alice", "bob"]);
    assert!(res.unknown_users.is_empty());
}

#[test]
fn scenario_invoker_bob_excluded() {
    let dir = directory(&["alice", "bob", "carol"]);
    let res = resolve(Some(&scenario_snapshot()), &dir, &[], "bob", ProcessDetail::Omit);
    assert_eq!(usernames(&res.recipients), ["alice"]);
}

#[test]
fn scenario_explicit_with_unknown() {
    let dir = directory(&["carol"]);
    let explicit = vec!["carol".to_string(), "dave".to_string()];
    let res = resolve(None, &dir, &explicit, "root", ProcessDetail::Omit);
    assert_eq!(usernames(&res.recipients), ["carol"]);
    assert_eq!(
        res.unknown_users,
        [UnknownUser {
            username: "dave".to_string()
        }]
    );
}

#[test]
fn explicit_users_with_detail_use_snapshot() {
    let dir = directory(&["alice", "bob"]);
    let explicit = vec!["bob".to_string()];
    let res = resolve(
        Some(&scenario_snapshot()),
        &dir,
        &explicit,
        "bob",
        ProcessDetail::Include,
    );
    // Explicit lists are not filtered by the invoker.
    assert_eq!(usernames(&res.recipients), ["bob"]);
    assert_eq!(res.recipients[0].processes[0].pid.0, 101);
}

// ============================================================================
// Properties
// ============================================================================

static NAMES: [&str; 6] = ["alice", "bob", "carol", "dave", "erin", "root"];

fn arb_snapshot() -> impl Strategy<Value = ProcessSnapshot> {
    prop::collection::vec(
        (1u32..100_000, prop::sample::select(&NAMES[..]), prop::collection::vec("[a-z]{1,6}", 0..4)),
        0..40,
    )
    .prop_map(|procs| {
        ProcessSnapshot::new(
            "h",
            procs
                .into_iter()
                .map(|(pid, owner, cmd)| ProcessRecord::new(pid, owner, cmd))
                .collect(),
        )
    })
}

fn arb_directory_names() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(&NAMES[..], 0..=NAMES.len())
}

proptest! {
    #[test]
    fn resolution_is_deterministic(
        snap in arb_snapshot(),
        names in arb_directory_names(),
        invoker in prop::sample::select(&NAMES[..]),
    ) {
        let dir = directory(&names);
        let a = resolve(Some(&snap), &dir, &[], invoker, ProcessDetail::Include);
        let b = resolve(Some(&snap), &dir, &[], invoker, ProcessDetail::Include);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn invoker_never_in_snapshot_derived_set(
        snap in arb_snapshot(),
        names in arb_directory_names(),
        invoker in prop::sample::select(&NAMES[..]),
    ) {
        let dir = directory(&names);
        let res = resolve(Some(&snap), &dir, &[], invoker, ProcessDetail::Omit);
        prop_assert!(res.recipients.iter().all(|r| r.user.username != invoker));
    }

    #[test]
    fn snapshot_derived_set_is_known_owners(
        snap in arb_snapshot(),
        names in arb_directory_names(),
    ) {
        let dir = directory(&names);
        let res = resolve(Some(&snap), &dir, &[], "nobody", ProcessDetail::Include);

        let expected: BTreeSet<&str> = snap
            .processes
            .iter()
            .map(|p| p.owner.as_str())
            .filter(|o| names.contains(o))
            .collect();
        let got: Vec<&str> = res.recipients.iter().map(|r| r.user.username.as_str()).collect();
        prop_assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
        prop_assert!(res.unknown_users.is_empty());

        for r in &res.recipients {
            prop_assert!(!r.processes.is_empty());
            prop_assert!(r.processes.iter().all(|p| p.owner == r.user.username));
        }
    }
}
