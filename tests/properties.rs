//! Randomized sequences of transitions, checked against the membership invariants after every
//! step.

#[macro_use]
mod common;

use crate::common::Harness;
use ledgergroups::{
    error::Error,
    schema::{Group, User, UserId},
};
use maplit::hashset;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::{collections::HashSet, sync::Arc, thread};

fn check_invariants(h: &Harness) {
    let groups = h
        .store
        .groups()
        .into_iter()
        .map(|group| group.id)
        .collect::<HashSet<_>>();
    for user in h.store.users() {
        let group = user
            .group
            .unwrap_or_else(|| panic!("user {} has no group", user.id));
        assert!(
            groups.contains(&group),
            "user {} points at missing group {}",
            user.id,
            group
        );
    }
    for invite in h.store.invites() {
        assert!(groups.contains(&invite.group));
    }
}

fn snapshot(h: &Harness) -> (Vec<User>, Vec<Group>) {
    (h.store.users(), h.store.groups())
}

fn step(h: &Harness, rng: &mut StdRng, users: &[UserId]) -> Result<(), Error> {
    let user = *users.choose(rng).unwrap();
    let current = h.current(user);
    match rng.gen_range(0..5) {
        0 => h.membership.create_group(user, "Shared").map(drop),
        1 => {
            let host = *users.choose(rng).unwrap();
            let group = h.current(host);
            let invite = h.invitations().issue(group.id, group.owner)?;
            h.membership.join_group(user, &invite.code).map(drop)
        }
        2 => h.membership.leave_group(user, current.id).map(drop),
        3 => h.membership.delete_group(user, current.id).map(drop),
        _ => h
            .membership
            .rename_group(user, current.id, "Renamed")
            .map(drop),
    }
}

#[test]
fn random_transitions_keep_every_user_in_exactly_one_group() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let h = Harness::new();
        let users = ["Amy", "Ben", "Cat", "Dan", "Eve"]
            .iter()
            .map(|name| h.sign_up(name).0.id)
            .collect::<Vec<_>>();

        for _ in 0..40 {
            let before = snapshot(&h);
            let result = step(&h, &mut rng, &users);
            check_invariants(&h);
            if let Err(err) = result {
                assert!(err.is_recoverable(), "{:?}", err);
                assert_eq!(snapshot(&h), before, "failed step changed state: {:?}", err);
            }
        }
    }
}

#[test]
fn creating_a_group_can_orphan_the_previous_one() {
    let h = Harness::new();
    let (amy, personal) = h.sign_up("Amy");
    let household = h.membership.create_group(amy.id, "Household").unwrap();

    let referenced = h
        .store
        .users()
        .into_iter()
        .filter_map(|user| user.group)
        .collect::<HashSet<_>>();
    assert_eq!(referenced, hashset! { household.id });

    let existing = h
        .store
        .groups()
        .into_iter()
        .map(|group| group.id)
        .collect::<HashSet<_>>();
    assert_eq!(existing, hashset! { personal.id, household.id });
}

/// The in-memory store runs one transaction at a time, so this only checks that membership
/// bookkeeping adds up when transitions come from many threads. Real interleavings are exercised
/// against Postgres in `tests/postgres.rs`.
#[test]
fn threaded_joins_and_leaves_keep_membership_bookkeeping() {
    let h = Arc::new(Harness::new());
    let (amy, household) = h.sign_up("Amy");
    let household = household.id;
    let joiners = (0..8)
        .map(|i| h.sign_up(&format!("User {}", i)).0.id)
        .collect::<Vec<_>>();
    let invite = h.invitations().issue(household, amy.id).unwrap();

    let handles = joiners
        .into_iter()
        .map(|user| {
            let h = h.clone();
            let code = invite.code.clone();
            thread::spawn(move || {
                let _ = h.membership.join_group(user, &code).unwrap();
                if user % 2 == 0 {
                    let _ = h.membership.leave_group(user, household).unwrap();
                }
                user
            })
        })
        .collect::<Vec<_>>();

    let mut stayed = hashset! { amy.id };
    for handle in handles {
        let user = handle.join().unwrap();
        if user % 2 != 0 {
            let _ = stayed.insert(user);
        }
    }

    check_invariants(&h);
    let members = h
        .membership
        .group_details(amy.id, household)
        .unwrap()
        .members
        .into_iter()
        .map(|member| member.id)
        .collect::<HashSet<_>>();
    assert_eq!(members, stayed);
}
