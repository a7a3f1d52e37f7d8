#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ledgergroups::{
    config::Settings,
    dal::{Isolation, MemoryStore, Repo, Store},
    error::Error,
    logic::{Invitations, Membership},
    schema::{Group, User, UserId},
    util::ManualClock,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

macro_rules! assert_matches {
    ($expr:expr, $pat:pat) => {
        match $expr {
            $pat => {}
            other => panic!("expected {}, got {:?}", stringify!($pat), other),
        }
    };
}

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub membership: Membership<MemoryStore>,
}

impl Harness {
    pub fn new() -> Harness {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(start()));
        let membership =
            Membership::with_clock(store.clone(), store.clone(), Settings::default(), clock.clone());
        Harness {
            store,
            clock,
            membership,
        }
    }

    pub fn invitations(&self) -> &Invitations<MemoryStore> {
        self.membership.invitations()
    }

    pub fn sign_up(&self, name: &str) -> (User, Group) {
        self.membership.sign_up(name).unwrap()
    }

    /// Creates a user without provisioning them, as the account system would.
    pub fn bare_user(&self, name: &str) -> User {
        self.store
            .transact(Isolation::ReadCommitted, None, far_deadline(), |conn| {
                conn.create_user(name).map_err(Error::from)
            })
            .unwrap()
    }

    /// Has `owner` invite `joiner` into their current group.
    pub fn invite_into(&self, owner: UserId, joiner: UserId) -> Group {
        let group = self.store.user(owner).unwrap().group.unwrap();
        let invite = self.invitations().issue(group, owner).unwrap();
        self.membership.join_group(joiner, &invite.code).unwrap()
    }

    pub fn current(&self, user: UserId) -> Group {
        let group = self.store.user(user).unwrap().group.unwrap();
        self.store.group(group).unwrap()
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.ymd(2026, 10, 1).and_hms(12, 0, 0)
}

pub fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(60)
}
