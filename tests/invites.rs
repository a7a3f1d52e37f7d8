#[macro_use]
mod common;

use crate::common::{start, Harness};
use chrono::Duration;
use ledgergroups::{
    error::Error,
    logic::code,
    schema::InviteStatus,
};

#[test]
fn issued_invites_validate() {
    let h = Harness::new();
    let (amy, household) = h.sign_up("Amy");

    let invite = h.invitations().issue(household.id, amy.id).unwrap();
    assert!(code::is_well_formed(&invite.code));
    assert_eq!(invite.expires, start() + Duration::hours(24));
    assert_eq!(
        invite.url,
        format!("http://localhost:3000/groups/join?code={}", invite.code)
    );

    assert_eq!(
        h.invitations().validate(&invite.code).unwrap(),
        InviteStatus {
            group: Some(household.id),
            valid: true,
        }
    );
    assert_eq!(
        h.invitations()
            .validate(&invite.code.to_lowercase())
            .unwrap()
            .valid,
        true
    );
}

#[test]
fn a_new_invite_replaces_the_live_one() {
    let h = Harness::new();
    let (amy, household) = h.sign_up("Amy");

    let first = h.invitations().issue(household.id, amy.id).unwrap();
    let second = h.invitations().issue(household.id, amy.id).unwrap();
    assert_ne!(first.code, second.code);

    let invites = h.store.invites();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].code, second.code);
    assert_eq!(invites[0].created_by, amy.id);

    assert_eq!(
        h.invitations().validate(&first.code).unwrap(),
        InviteStatus {
            group: None,
            valid: false,
        }
    );
}

#[test]
fn invites_are_valid_up_to_their_expiry() {
    let h = Harness::new();
    let (amy, household) = h.sign_up("Amy");
    let invite = h.invitations().issue(household.id, amy.id).unwrap();

    h.clock.advance(Duration::hours(24));
    assert!(h.invitations().validate(&invite.code).unwrap().valid);
    assert_eq!(h.store.invites().len(), 1);
}

#[test]
fn expired_invites_are_deleted_when_checked() {
    let h = Harness::new();
    let (amy, household) = h.sign_up("Amy");
    let invite = h.invitations().issue(household.id, amy.id).unwrap();

    h.clock.advance(Duration::hours(24) + Duration::seconds(1));
    assert_eq!(
        h.invitations().validate(&invite.code).unwrap(),
        InviteStatus {
            group: Some(household.id),
            valid: false,
        }
    );
    assert!(h.store.invites().is_empty());

    // Checking again finds nothing, and is not an error.
    assert_eq!(
        h.invitations().validate(&invite.code).unwrap(),
        InviteStatus {
            group: None,
            valid: false,
        }
    );
}

#[test]
fn joining_with_an_expired_invite_fails_but_still_deletes_it() {
    let h = Harness::new();
    let (amy, household) = h.sign_up("Amy");
    let (ben, bens) = h.sign_up("Ben");
    let invite = h.invitations().issue(household.id, amy.id).unwrap();

    h.clock.advance(Duration::hours(25));
    assert_matches!(
        h.membership.join_group(ben.id, &invite.code),
        Err(Error::Expired)
    );
    assert!(h.store.invites().is_empty());
    assert_eq!(h.store.user(ben.id).unwrap().group, Some(bens.id));
}

#[test]
fn malformed_codes_are_never_valid() {
    let h = Harness::new();
    for bad in &["", "ABC", "ABCDEFGHIJK", "ABCDE-1234"] {
        assert_eq!(
            h.invitations().validate(bad).unwrap(),
            InviteStatus {
                group: None,
                valid: false,
            }
        );
    }
}

#[test]
fn only_the_owner_may_issue_invites() {
    let h = Harness::new();
    let (amy, household) = h.sign_up("Amy");
    let (ben, _) = h.sign_up("Ben");
    let _ = h.invite_into(amy.id, ben.id);
    let before = h.store.invites();

    assert_matches!(
        h.invitations().issue(household.id, ben.id),
        Err(Error::Forbidden)
    );
    assert_eq!(h.store.invites(), before);
}

#[test]
fn invites_for_missing_groups_are_not_issued() {
    let h = Harness::new();
    let (amy, _) = h.sign_up("Amy");

    assert_matches!(
        h.invitations().issue(uuid::Uuid::new_v4(), amy.id),
        Err(Error::NotFound("group"))
    );
    assert!(h.store.invites().is_empty());
}

#[test]
fn reissuing_after_expiry_leaves_the_old_invite_for_purging() {
    let h = Harness::new();
    let (amy, household) = h.sign_up("Amy");
    let old = h.invitations().issue(household.id, amy.id).unwrap();

    h.clock.advance(Duration::hours(48));
    let new = h.invitations().issue(household.id, amy.id).unwrap();
    assert_eq!(h.store.invites().len(), 2);

    assert_eq!(h.invitations().purge_expired().unwrap(), 1);
    let invites = h.store.invites();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].code, new.code);
    assert_ne!(invites[0].code, old.code);

    assert_eq!(h.invitations().purge_expired().unwrap(), 0);
}
