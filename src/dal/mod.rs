//! Bindings to the database.
//!
//! > **DAL**, for lack of a better term (borrowing this one from "data access layer" since I don't
//! > want to use "model"), is the only module that does any talking to the database, or any other
//! > IO or interaction with other kinds of externalized state for that matter.
//!
//! Every operation here is a single statement (or close to it). Anything that needs to hold an
//! invariant across several of them runs them inside `Store::transact`.

mod memory;
mod pg;
#[allow(proc_macro_derive_resolution_fallback, unused_import_braces)]
mod schema;

embed_migrations!("migrations");

pub use crate::dal::memory::{MemoryConn, MemoryStore};
use crate::{
    error::Error,
    schema::{Group, GroupId, GroupInvite, InviteId, User, UserGroups, UserId},
};
use chrono::{DateTime, Utc};
use diesel::{
    prelude::*,
    r2d2::{ConnectionManager, Pool},
};
use failure::Fallible;
use std::{sync::Arc, time::Instant};

/// The operations a storage connection supports. Implementors only guarantee atomicity for a
/// single call; callers compose them inside `Store::transact`.
pub trait Repo {
    /// Creates a user with no group.
    fn create_user(&self, name: &str) -> Fallible<User>;

    /// Looks up a user.
    fn find_user(&self, user: UserId) -> Fallible<Option<User>>;

    /// Creates a group.
    fn create_group(&self, name: &str, owner: UserId, now: DateTime<Utc>) -> Fallible<Group>;

    /// Looks up a group.
    fn find_group(&self, group: GroupId) -> Fallible<Option<Group>>;

    /// Renames a group, returning the updated group.
    fn rename_group(&self, group: GroupId, name: &str) -> Fallible<Group>;

    /// Deletes a group along with its invites, categories, and ledger entries. Fails if any user
    /// still has it as their current group.
    fn delete_group(&self, group: GroupId) -> Fallible<()>;

    /// Sets a user's current group.
    fn set_user_group(&self, user: UserId, group: GroupId) -> Fallible<()>;

    /// Counts the users whose current group is the given group.
    fn count_members(&self, group: GroupId) -> Fallible<i64>;

    /// Lists the users whose current group is the given group, by ID.
    fn list_members(&self, group: GroupId) -> Fallible<Vec<User>>;

    /// Gets a user's current group and the groups they own, or `None` if the user doesn't exist.
    fn user_groups(&self, user: UserId) -> Fallible<Option<UserGroups>>;

    /// Stores an invite.
    fn create_invite(
        &self,
        group: GroupId,
        created_by: UserId,
        code: &str,
        expires: DateTime<Utc>,
    ) -> Fallible<GroupInvite>;

    /// Deletes the group's invites that have not yet expired (`expires >= now`), returning how many
    /// there were.
    fn delete_non_expired_invites(&self, group: GroupId, now: DateTime<Utc>) -> Fallible<usize>;

    /// Looks up an invite by its code.
    fn find_invite_by_code(&self, code: &str) -> Fallible<Option<GroupInvite>>;

    /// Deletes an invite. Deleting an invite that is already gone is not an error; the return
    /// value is the number of invites actually deleted.
    fn delete_invite(&self, invite: InviteId) -> Fallible<usize>;

    /// Deletes every invite that has expired (`expires < now`).
    fn delete_expired_invites(&self, now: DateTime<Utc>) -> Fallible<usize>;
}

/// Something that can run a closure over a `Repo` as one transaction.
pub trait Store: Clone + Send + Sync + 'static {
    /// The connection type handed to transactions.
    type Conn: Repo;

    /// Runs `func` in a transaction. The transaction is committed if `func` returns `Ok` before
    /// `deadline`, and rolled back otherwise.
    ///
    /// If `lock` is given, it is acquired before the transaction begins and released after it
    /// ends, so a transaction that had to wait for it still sees everything its predecessor
    /// committed.
    fn transact<T, F>(
        &self,
        isolation: Isolation,
        lock: Option<LockKey>,
        deadline: Instant,
        func: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(&Self::Conn) -> Result<T, Error>;
}

/// The isolation level a transaction runs at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Isolation {
    /// Each statement sees everything committed before it started.
    ReadCommitted,

    /// The transaction behaves as if it ran alone.
    Serializable,
}

/// A lock held around a transaction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LockKey {
    /// Held while a user's membership changes.
    User(UserId),

    /// Held while a group's invites change.
    Group(GroupId),
}

impl LockKey {
    /// The pair of keys used for `pg_advisory_lock(int, int)`. Group IDs are folded down to 32
    /// bits by XORing their four words together.
    pub fn advisory_keys(self) -> (i32, i32) {
        match self {
            LockKey::User(user) => (1, user),
            LockKey::Group(group) => {
                let folded = group.as_bytes().chunks(4).fold(0u32, |acc, w| {
                    acc ^ u32::from_be_bytes([w[0], w[1], w[2], w[3]])
                });
                (2, folded as i32)
            }
        }
    }
}

/// A pool of connections to the database.
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct DB {
    pool: Arc<Pool<ConnectionManager<PgConnection>>>,
}

impl DB {
    /// Connects to the database with at the given URL.
    pub fn connect(database_url: &str) -> Fallible<DB> {
        let pool = Arc::new(Pool::new(ConnectionManager::new(database_url))?);
        embedded_migrations::run(&*pool.get()?)?;
        Ok(DB { pool })
    }
}

impl Store for DB {
    type Conn = PgConnection;

    fn transact<T, F>(
        &self,
        isolation: Isolation,
        lock: Option<LockKey>,
        deadline: Instant,
        func: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(&PgConnection) -> Result<T, Error>,
    {
        let conn = self.pool.get()?;
        let result = match lock {
            Some(key) => pg::with_session_lock(&*conn, key, deadline, || {
                run_transaction(&*conn, isolation, deadline, func)
            }),
            None => run_transaction(&*conn, isolation, deadline, func),
        };

        // A statement cancelled by statement_timeout surfaces as a generic database error.
        match result {
            Err(Error::Storage(_)) if Instant::now() >= deadline => Err(Error::TimedOut),
            result => result,
        }
    }
}

fn run_transaction<T, F>(
    conn: &PgConnection,
    isolation: Isolation,
    deadline: Instant,
    func: F,
) -> Result<T, Error>
where
    F: FnOnce(&PgConnection) -> Result<T, Error>,
{
    let mut builder = conn.build_transaction();
    if isolation == Isolation::Serializable {
        builder = builder.serializable();
    }
    builder.run(|| {
        pg::set_statement_timeout(conn, deadline)?;
        let value = func(conn)?;
        if Instant::now() >= deadline {
            return Err(Error::TimedOut);
        }
        Ok(value)
    })
}

#[cfg(test)]
mod tests {
    use super::LockKey;
    use uuid::Uuid;

    #[test]
    fn lock_keys_do_not_collide_across_kinds() {
        let group = Uuid::nil();
        assert_eq!(LockKey::User(0).advisory_keys(), (1, 0));
        assert_eq!(LockKey::Group(group).advisory_keys(), (2, 0));
    }

    #[test]
    fn group_lock_keys_fold_every_byte() {
        let group = Uuid::from_bytes(&[0, 0, 1, 0, 9, 9, 9, 9, 9, 9, 9, 9, 0, 0, 0, 1]).unwrap();
        assert_eq!(LockKey::Group(group).advisory_keys(), (2, 257));
    }

    #[test]
    fn groups_sharing_a_prefix_get_different_keys() {
        let a = Uuid::from_bytes(&[7, 7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap();
        let b = Uuid::from_bytes(&[7, 7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]).unwrap();
        assert_ne!(
            LockKey::Group(a).advisory_keys(),
            LockKey::Group(b).advisory_keys()
        );
    }
}
