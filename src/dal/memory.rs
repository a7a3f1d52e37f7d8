//! A store that lives in memory, for tests and for running without a database.
//!
//! Transactions take a single lock on the whole store and work on a copy of its state, which only
//! replaces the real state on commit. That makes every transaction serializable and makes rollback
//! free. The foreign keys and cascades of the Postgres schema are checked by hand.

use crate::{
    dal::{Isolation, LockKey, Repo, Store},
    error::Error,
    logic::seed::{Seeder, DEFAULT_CATEGORIES},
    schema::{Category, Group, GroupId, GroupInvite, InviteId, User, UserGroups, UserId},
};
use antidote::Mutex;
use chrono::{DateTime, Utc};
use failure::{bail, format_err, Fallible};
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    thread::sleep,
    time::{Duration, Instant},
};
use uuid::Uuid;

/// An in-memory `Store`.
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

#[derive(Clone, Debug, Default)]
struct State {
    last_user: UserId,
    users: BTreeMap<UserId, User>,
    groups: BTreeMap<GroupId, Group>,
    invites: BTreeMap<InviteId, GroupInvite>,
    categories: Vec<Category>,
}

struct Faults {
    failures: Mutex<HashSet<&'static str>>,
    stalls: Mutex<HashMap<&'static str, Duration>>,
}

impl Faults {
    fn trip(&self, op: &'static str) -> Fallible<()> {
        let stall = self.stalls.lock().get(op).cloned();
        if let Some(stall) = stall {
            sleep(stall);
        }
        if self.failures.lock().remove(op) {
            bail!("Injected failure in {}", op);
        }
        Ok(())
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore {
            state: Arc::new(Mutex::new(State::default())),
            faults: Arc::new(Faults {
                failures: Mutex::new(HashSet::new()),
                stalls: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Makes the next call to the named operation fail with a storage error. Operations are named
    /// after their `Repo` (or `Seeder`) method.
    pub fn fail_on(&self, op: &'static str) {
        let _ = self.faults.failures.lock().insert(op);
    }

    /// Makes every call to the named operation sleep first.
    pub fn stall(&self, op: &'static str, by: Duration) {
        let _ = self.faults.stalls.lock().insert(op, by);
    }

    /// Gets a user as of the last commit.
    pub fn user(&self, user: UserId) -> Option<User> {
        self.state.lock().users.get(&user).cloned()
    }

    /// Gets every user as of the last commit.
    pub fn users(&self) -> Vec<User> {
        self.state.lock().users.values().cloned().collect()
    }

    /// Gets a group as of the last commit.
    pub fn group(&self, group: GroupId) -> Option<Group> {
        self.state.lock().groups.get(&group).cloned()
    }

    /// Gets every group as of the last commit.
    pub fn groups(&self) -> Vec<Group> {
        self.state.lock().groups.values().cloned().collect()
    }

    /// Gets every invite as of the last commit.
    pub fn invites(&self) -> Vec<GroupInvite> {
        self.state.lock().invites.values().cloned().collect()
    }

    /// Gets a group's categories as of the last commit.
    pub fn categories(&self, group: GroupId) -> Vec<Category> {
        self.state
            .lock()
            .categories
            .iter()
            .filter(|category| category.group == group)
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> MemoryStore {
        MemoryStore::new()
    }
}

impl Store for MemoryStore {
    type Conn = MemoryConn;

    fn transact<T, F>(
        &self,
        _isolation: Isolation,
        _lock: Option<LockKey>,
        deadline: Instant,
        func: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(&MemoryConn) -> Result<T, Error>,
    {
        // Holding the whole store covers any finer-grained lock.
        let mut state = self.state.lock();
        if Instant::now() >= deadline {
            return Err(Error::TimedOut);
        }

        let conn = MemoryConn {
            state: RefCell::new((*state).clone()),
            faults: self.faults.clone(),
        };
        let value = func(&conn)?;
        if Instant::now() >= deadline {
            return Err(Error::TimedOut);
        }

        *state = conn.state.into_inner();
        Ok(value)
    }
}

impl Seeder for MemoryStore {
    fn seed_default_categories(&self, group: GroupId, creator: UserId) -> Fallible<()> {
        self.faults.trip("seed_default_categories")?;
        let mut state = self.state.lock();
        if !state.groups.contains_key(&group) {
            bail!("Group {} does not exist", group);
        }
        for &(name, kind) in DEFAULT_CATEGORIES {
            let exists = state
                .categories
                .iter()
                .any(|category| category.group == group && category.name == name);
            if !exists {
                state.categories.push(Category {
                    group,
                    name: name.to_string(),
                    kind,
                    created_by: creator,
                });
            }
        }
        Ok(())
    }
}

/// The connection handed to `MemoryStore` transactions.
#[allow(missing_debug_implementations)]
pub struct MemoryConn {
    state: RefCell<State>,
    faults: Arc<Faults>,
}

impl Repo for MemoryConn {
    fn create_user(&self, name: &str) -> Fallible<User> {
        self.faults.trip("create_user")?;
        let mut state = self.state.borrow_mut();
        state.last_user += 1;
        let user = User {
            id: state.last_user,
            name: name.to_string(),
            group: None,
        };
        let _ = state.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn find_user(&self, user: UserId) -> Fallible<Option<User>> {
        self.faults.trip("find_user")?;
        Ok(self.state.borrow().users.get(&user).cloned())
    }

    fn create_group(&self, name: &str, owner: UserId, now: DateTime<Utc>) -> Fallible<Group> {
        self.faults.trip("create_group")?;
        let mut state = self.state.borrow_mut();
        if !state.users.contains_key(&owner) {
            bail!("User {} does not exist", owner);
        }
        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner,
            created: now,
        };
        let _ = state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn find_group(&self, group: GroupId) -> Fallible<Option<Group>> {
        self.faults.trip("find_group")?;
        Ok(self.state.borrow().groups.get(&group).cloned())
    }

    fn rename_group(&self, group: GroupId, name: &str) -> Fallible<Group> {
        self.faults.trip("rename_group")?;
        let mut state = self.state.borrow_mut();
        let group = state
            .groups
            .get_mut(&group)
            .ok_or_else(|| format_err!("Group {} does not exist", group))?;
        group.name = name.to_string();
        Ok(group.clone())
    }

    fn delete_group(&self, group: GroupId) -> Fallible<()> {
        self.faults.trip("delete_group")?;
        let mut state = self.state.borrow_mut();
        if state.users.values().any(|user| user.group == Some(group)) {
            bail!("Group {} is still some user's current group", group);
        }
        if state.groups.remove(&group).is_none() {
            bail!("Group {} does not exist", group);
        }
        state.invites.retain(|_, invite| invite.group != group);
        state.categories.retain(|category| category.group != group);
        Ok(())
    }

    fn set_user_group(&self, user: UserId, group: GroupId) -> Fallible<()> {
        self.faults.trip("set_user_group")?;
        let mut state = self.state.borrow_mut();
        if !state.groups.contains_key(&group) {
            bail!("Group {} does not exist", group);
        }
        let user = state
            .users
            .get_mut(&user)
            .ok_or_else(|| format_err!("User {} does not exist", user))?;
        user.group = Some(group);
        Ok(())
    }

    fn count_members(&self, group: GroupId) -> Fallible<i64> {
        self.faults.trip("count_members")?;
        let state = self.state.borrow();
        let count = state
            .users
            .values()
            .filter(|user| user.group == Some(group))
            .count();
        Ok(count as i64)
    }

    fn list_members(&self, group: GroupId) -> Fallible<Vec<User>> {
        self.faults.trip("list_members")?;
        let state = self.state.borrow();
        Ok(state
            .users
            .values()
            .filter(|user| user.group == Some(group))
            .cloned()
            .collect())
    }

    fn user_groups(&self, user: UserId) -> Fallible<Option<UserGroups>> {
        self.faults.trip("user_groups")?;
        let state = self.state.borrow();
        Ok(state.users.get(&user).map(|found| UserGroups {
            current: found.group,
            owned: state
                .groups
                .values()
                .filter(|group| group.owner == user)
                .map(|group| group.id)
                .collect(),
        }))
    }

    fn create_invite(
        &self,
        group: GroupId,
        created_by: UserId,
        code: &str,
        expires: DateTime<Utc>,
    ) -> Fallible<GroupInvite> {
        self.faults.trip("create_invite")?;
        let mut state = self.state.borrow_mut();
        if !state.groups.contains_key(&group) {
            bail!("Group {} does not exist", group);
        }
        if state.invites.values().any(|invite| invite.code == code) {
            bail!("Invite code {} is already in use", code);
        }
        let invite = GroupInvite {
            id: Uuid::new_v4(),
            group,
            code: code.to_string(),
            created_by,
            expires,
        };
        let _ = state.invites.insert(invite.id, invite.clone());
        Ok(invite)
    }

    fn delete_non_expired_invites(&self, group: GroupId, now: DateTime<Utc>) -> Fallible<usize> {
        self.faults.trip("delete_non_expired_invites")?;
        let mut state = self.state.borrow_mut();
        let before = state.invites.len();
        state
            .invites
            .retain(|_, invite| !(invite.group == group && invite.expires >= now));
        Ok(before - state.invites.len())
    }

    fn find_invite_by_code(&self, code: &str) -> Fallible<Option<GroupInvite>> {
        self.faults.trip("find_invite_by_code")?;
        let state = self.state.borrow();
        Ok(state
            .invites
            .values()
            .find(|invite| invite.code == code)
            .cloned())
    }

    fn delete_invite(&self, invite: InviteId) -> Fallible<usize> {
        self.faults.trip("delete_invite")?;
        let removed = self.state.borrow_mut().invites.remove(&invite);
        Ok(if removed.is_some() { 1 } else { 0 })
    }

    fn delete_expired_invites(&self, now: DateTime<Utc>) -> Fallible<usize> {
        self.faults.trip("delete_expired_invites")?;
        let mut state = self.state.borrow_mut();
        let before = state.invites.len();
        state.invites.retain(|_, invite| invite.expires >= now);
        Ok(before - state.invites.len())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::{
        dal::{Isolation, Repo, Store},
        error::Error,
    };
    use chrono::Utc;
    use failure::format_err;
    use std::time::{Duration, Instant};

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn commits_on_success() {
        let store = MemoryStore::new();
        let user = store
            .transact(Isolation::Serializable, None, soon(), |conn| {
                conn.create_user("Amy").map_err(Error::from)
            })
            .unwrap();
        assert_eq!(store.user(user.id), Some(user));
    }

    #[test]
    fn rolls_back_on_error() {
        let store = MemoryStore::new();
        let result: Result<(), Error> =
            store.transact(Isolation::Serializable, None, soon(), |conn| {
                let _ = conn.create_user("Amy")?;
                Err(Error::from(format_err!("boom")))
            });
        assert!(result.is_err());
        assert!(store.users().is_empty());
    }

    #[test]
    fn rolls_back_after_the_deadline() {
        let store = MemoryStore::new();
        store.stall("create_user", Duration::from_millis(50));
        let deadline = Instant::now() + Duration::from_millis(10);
        let result = store.transact(Isolation::Serializable, None, deadline, |conn| {
            conn.create_user("Amy").map_err(Error::from)
        });
        match result {
            Err(Error::TimedOut) => {}
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert!(store.users().is_empty());
    }

    #[test]
    fn groups_in_use_cannot_be_deleted() {
        let store = MemoryStore::new();
        let result = store.transact(Isolation::Serializable, None, soon(), |conn| {
            let user = conn.create_user("Amy")?;
            let group = conn.create_group("Amy's ledger", user.id, Utc::now())?;
            conn.set_user_group(user.id, group.id)?;
            conn.delete_group(group.id).map_err(Error::from)
        });
        assert!(result.is_err());
    }

    #[test]
    fn deleting_a_group_cascades_to_its_invites() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .transact(Isolation::Serializable, None, soon(), |conn| {
                let user = conn.create_user("Amy")?;
                let group = conn.create_group("Amy's ledger", user.id, now)?;
                let _ = conn.create_invite(group.id, user.id, "ABCDE12345", now)?;
                conn.delete_group(group.id).map_err(Error::from)
            })
            .unwrap();
        assert!(store.groups().is_empty());
        assert!(store.invites().is_empty());
    }

    #[test]
    fn deleting_an_invite_twice_finds_nothing_the_second_time() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let invite = store
            .transact(Isolation::ReadCommitted, None, soon(), |conn| {
                let user = conn.create_user("Amy")?;
                let group = conn.create_group("Amy's ledger", user.id, now)?;
                conn.set_user_group(user.id, group.id)?;
                conn.create_invite(group.id, user.id, "ABCDE12345", now)
                    .map_err(Error::from)
            })
            .unwrap();

        let deleted = store
            .transact(Isolation::ReadCommitted, None, soon(), |conn| {
                let first = conn.delete_invite(invite.id)?;
                let second = conn.delete_invite(invite.id)?;
                Ok((first, second))
            })
            .unwrap();
        assert_eq!(deleted, (1, 0));
        assert!(store.invites().is_empty());
    }

    #[test]
    fn injected_failures_fire_once() {
        let store = MemoryStore::new();
        store.fail_on("create_user");
        let first = store.transact(Isolation::Serializable, None, soon(), |conn| {
            conn.create_user("Amy").map_err(Error::from)
        });
        assert!(first.is_err());
        let second = store.transact(Isolation::Serializable, None, soon(), |conn| {
            conn.create_user("Amy").map_err(Error::from)
        });
        assert!(second.is_ok());
    }
}
