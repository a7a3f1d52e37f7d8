//! Moving users between groups.
//!
//! Every user belongs to exactly one group once they've signed up. Each operation here runs as a
//! single serializable transaction holding the acting user's lock, so the only thing that can be
//! observed from outside is the state before or the state after. Seeding a new group's default
//! categories happens after commit, and never fails the operation.

use crate::{
    config::Settings,
    dal::{Isolation, LockKey, Repo, Store},
    error::Error,
    logic::{code, invite, invite::Invitations, seed::Seeder},
    schema::{Group, GroupDetails, GroupId, User, UserId},
    util::{Clock, SystemClock},
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// The longest a group name may be, in characters.
pub const MAX_NAME_LEN: usize = 50;

/// The name given to a user's personal group.
pub fn personal_group_name(display_name: &str) -> String {
    format!("{}'s ledger", display_name)
}

/// Trims a group name and checks that it's an acceptable length.
pub fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 {
        Err(Error::InvalidName("the name must not be empty".to_string()))
    } else if len > MAX_NAME_LEN {
        Err(Error::InvalidName(format!(
            "the name must be at most {} characters",
            MAX_NAME_LEN
        )))
    } else {
        Ok(name.to_string())
    }
}

/// The membership engine.
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct Membership<S> {
    store: S,
    seeder: Arc<dyn Seeder>,
    clock: Arc<dyn Clock>,
    invitations: Invitations<S>,
    timeout: Duration,
}

impl<S: Store> Membership<S> {
    /// Creates the engine, using the system clock.
    pub fn new<D: Seeder + 'static>(store: S, seeder: D, settings: Settings) -> Membership<S> {
        Membership::with_clock(store, seeder, settings, Arc::new(SystemClock))
    }

    /// Creates the engine with the given clock.
    pub fn with_clock<D: Seeder + 'static>(
        store: S,
        seeder: D,
        settings: Settings,
        clock: Arc<dyn Clock>,
    ) -> Membership<S> {
        let settings = Arc::new(settings);
        Membership {
            invitations: Invitations::new(store.clone(), clock.clone(), settings.clone()),
            store,
            seeder: Arc::new(seeder),
            clock,
            timeout: settings.transition_timeout,
        }
    }

    /// Returns a copy of the engine whose operations must finish within `timeout`; anything that
    /// takes longer is rolled back.
    pub fn with_timeout(&self, timeout: Duration) -> Membership<S> {
        Membership {
            invitations: self.invitations.with_timeout(timeout),
            timeout,
            ..self.clone()
        }
    }

    /// The invitation service sharing this engine's store.
    pub fn invitations(&self) -> &Invitations<S> {
        &self.invitations
    }

    /// Creates a user and gives them their personal group.
    pub fn sign_up(&self, display_name: &str) -> Result<(User, Group), Error> {
        let now = self.clock.now();
        let (user, group) = self.transact(None, |conn| {
            let user = conn.create_user(display_name)?;
            let group = provision(conn, &user, display_name, now)?;
            Ok((user, group))
        })?;

        info!("Signed up user {} with personal group {}", user.id, group.id);
        self.seed(&group, user.id);
        let user = User {
            group: Some(group.id),
            ..user
        };
        Ok((user, group))
    }

    /// Gives a freshly created user their personal group.
    pub fn provision_on_signup(&self, user: UserId, display_name: &str) -> Result<Group, Error> {
        let now = self.clock.now();
        let group = self.transact(Some(user), |conn| {
            let found = conn.find_user(user)?.ok_or(Error::NotFound("user"))?;
            provision(conn, &found, display_name, now)
        })?;

        info!("Provisioned user {} with personal group {}", user, group.id);
        self.seed(&group, user);
        Ok(group)
    }

    /// Creates a group owned by the requester and moves them into it. The group they were in
    /// before is left alone, even if that leaves it empty.
    pub fn create_group(&self, requester: UserId, name: &str) -> Result<Group, Error> {
        let name = validate_name(name)?;
        let now = self.clock.now();
        let group = self.transact(Some(requester), |conn| {
            let user = conn.find_user(requester)?.ok_or(Error::NotFound("user"))?;
            let _ = current_group_of(&user)?;
            let group = conn.create_group(&name, requester, now)?;
            conn.set_user_group(requester, group.id)?;
            Ok(group)
        })?;

        info!("User {} created group {}", requester, group.id);
        self.seed(&group, requester);
        Ok(group)
    }

    /// Moves the requester into the group an invite code leads to. If they were the only member
    /// of a group they own, that group is deleted.
    pub fn join_group(&self, requester: UserId, invite_code: &str) -> Result<Group, Error> {
        let invite_code = code::normalize(invite_code);
        if !code::is_well_formed(&invite_code) {
            return Err(Error::NotFound("invite"));
        }

        // This deletes the invite if it has expired, which must stick even though the join fails.
        let status = self.invitations.validate(&invite_code)?;
        if !status.valid {
            return Err(match status.group {
                Some(_) => Error::Expired,
                None => Error::NotFound("invite"),
            });
        }

        let now = self.clock.now();
        let (target, deleted) = self.transact(Some(requester), |conn| {
            let invite = invite::resolve(conn, &invite_code, now)?;
            let target = conn
                .find_group(invite.group)?
                .ok_or(Error::NotFound("group"))?;
            let groups = conn
                .user_groups(requester)?
                .ok_or(Error::NotFound("user"))?;
            let current = groups
                .current
                .ok_or_else(|| Error::InvalidState("You have not been signed up yet".into()))?;
            if current == target.id {
                return Err(Error::InvalidState(
                    "You are already a member of this group".into(),
                ));
            }

            let solo = groups.owned.contains(&current) && conn.count_members(current)? == 1;
            conn.set_user_group(requester, target.id)?;
            if solo {
                conn.delete_group(current)?;
            }
            Ok((target, if solo { Some(current) } else { None }))
        })?;

        match deleted {
            Some(old) => info!(
                "User {} joined group {}, deleting their solo group {}",
                requester, target.id, old
            ),
            None => info!("User {} joined group {}", requester, target.id),
        }
        Ok(target)
    }

    /// Moves the requester out of a group and into a fresh personal group. An owner may only
    /// leave once everyone else has, in which case the group is deleted.
    pub fn leave_group(&self, requester: UserId, group: GroupId) -> Result<Group, Error> {
        let now = self.clock.now();
        let (personal, owned) = self.transact(Some(requester), |conn| {
            let user = conn.find_user(requester)?.ok_or(Error::NotFound("user"))?;
            if user.group != Some(group) {
                return Err(Error::InvalidState(
                    "You are not a member of this group".into(),
                ));
            }
            let left = conn.find_group(group)?.ok_or(Error::NotFound("group"))?;

            let owner = left.owner == requester;
            if owner && conn.count_members(group)? > 1 {
                return Err(Error::InvalidState(
                    "The owner cannot leave while other members exist".into(),
                ));
            }

            let personal = conn.create_group(&personal_group_name(&user.name), requester, now)?;
            conn.set_user_group(requester, personal.id)?;
            if owner {
                conn.delete_group(group)?;
            }
            Ok((personal, owner))
        })?;

        if owned {
            info!(
                "User {} left and deleted group {}, moving to {}",
                requester, group, personal.id
            );
        } else {
            info!(
                "User {} left group {}, moving to {}",
                requester, group, personal.id
            );
        }
        self.seed(&personal, requester);
        Ok(personal)
    }

    /// Deletes a group, moving every member into a fresh personal group first. Only the group's
    /// owner may do this. Returns the new personal groups, by user.
    pub fn delete_group(
        &self,
        requester: UserId,
        group: GroupId,
    ) -> Result<Vec<(UserId, Group)>, Error> {
        let now = self.clock.now();
        let moved = self.transact(Some(requester), |conn| {
            let found = conn.find_group(group)?.ok_or(Error::NotFound("group"))?;
            if found.owner != requester {
                return Err(Error::Forbidden);
            }

            let mut moved = Vec::new();
            for member in conn.list_members(group)? {
                let personal =
                    conn.create_group(&personal_group_name(&member.name), member.id, now)?;
                conn.set_user_group(member.id, personal.id)?;
                moved.push((member.id, personal));
            }
            conn.delete_group(group)?;
            Ok(moved)
        })?;

        info!(
            "User {} deleted group {}, rehoming {} member(s)",
            requester,
            group,
            moved.len()
        );
        for (member, personal) in &moved {
            self.seed(personal, *member);
        }
        Ok(moved)
    }

    /// Renames a group. Only the group's owner may do this.
    pub fn rename_group(
        &self,
        requester: UserId,
        group: GroupId,
        name: &str,
    ) -> Result<Group, Error> {
        let name = validate_name(name)?;
        let renamed = self.transact(Some(requester), |conn| {
            let found = conn.find_group(group)?.ok_or(Error::NotFound("group"))?;
            if found.owner != requester {
                return Err(Error::Forbidden);
            }
            conn.rename_group(group, &name).map_err(Error::from)
        })?;

        info!("User {} renamed group {}", requester, group);
        Ok(renamed)
    }

    /// Gets a group and its members. Only members may see this.
    pub fn group_details(&self, requester: UserId, group: GroupId) -> Result<GroupDetails, Error> {
        self.read(|conn| {
            let found = conn.find_group(group)?.ok_or(Error::NotFound("group"))?;
            let user = conn.find_user(requester)?.ok_or(Error::NotFound("user"))?;
            if user.group != Some(group) {
                return Err(Error::Forbidden);
            }
            Ok(GroupDetails::new(found, conn.list_members(group)?))
        })
    }

    /// Gets the user's current group and its members.
    pub fn current_group(&self, user: UserId) -> Result<GroupDetails, Error> {
        self.read(|conn| {
            let found = conn.find_user(user)?.ok_or(Error::NotFound("user"))?;
            let group = current_group_of(&found)?;
            let group = conn.find_group(group)?.ok_or(Error::NotFound("group"))?;
            let members = conn.list_members(group.id)?;
            Ok(GroupDetails::new(group, members))
        })
    }

    fn transact<T, F>(&self, user: Option<UserId>, func: F) -> Result<T, Error>
    where
        F: FnOnce(&S::Conn) -> Result<T, Error>,
    {
        self.store.transact(
            Isolation::Serializable,
            user.map(LockKey::User),
            self.deadline(),
            func,
        )
    }

    fn read<T, F>(&self, func: F) -> Result<T, Error>
    where
        F: FnOnce(&S::Conn) -> Result<T, Error>,
    {
        self.store
            .transact(Isolation::ReadCommitted, None, self.deadline(), func)
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    fn seed(&self, group: &Group, creator: UserId) {
        if let Err(err) = self.seeder.seed_default_categories(group.id, creator) {
            warn!(
                "Couldn't seed default categories for group {}: {}",
                group.id, err
            );
        }
    }
}

fn provision<C: Repo>(
    conn: &C,
    user: &User,
    display_name: &str,
    now: DateTime<Utc>,
) -> Result<Group, Error> {
    if user.group.is_some() {
        return Err(Error::InvalidState(
            "This user already belongs to a group".into(),
        ));
    }
    let group = conn.create_group(&personal_group_name(display_name), user.id, now)?;
    conn.set_user_group(user.id, group.id)?;
    Ok(group)
}

fn current_group_of(user: &User) -> Result<GroupId, Error> {
    user.group
        .ok_or_else(|| Error::InvalidState("You have not been signed up yet".into()))
}
