use crate::{
    dal::{
        schema::{categories, group_invites, groups, users},
        LockKey, Repo, DB,
    },
    error::Error,
    logic::seed::{Seeder, DEFAULT_CATEGORIES},
    schema::{Group, GroupId, GroupInvite, InviteId, User, UserGroups, UserId},
};
use chrono::{DateTime, Utc};
use diesel::{
    dsl::{delete, insert_into, update},
    prelude::*,
    sql_query,
    sql_types::Integer,
};
use failure::{bail, Fallible};
use log::{debug, warn};
use std::time::Instant;
use uuid::Uuid;

fn millis_until(deadline: Instant) -> Result<u128, Error> {
    let left = deadline
        .checked_duration_since(Instant::now())
        .ok_or(Error::TimedOut)?;
    Ok(left.as_millis().max(1))
}

/// Bounds every statement in the current transaction by the time left until `deadline`.
pub(super) fn set_statement_timeout(conn: &PgConnection, deadline: Instant) -> Result<(), Error> {
    let millis = millis_until(deadline)?;
    let _ = sql_query(format!("SET LOCAL statement_timeout = {}", millis)).execute(conn)?;
    Ok(())
}

/// Runs `func` while holding a session-level advisory lock on `conn`. Waiting for the lock gives
/// up at `deadline`. The lock is released however `func` ends.
pub(super) fn with_session_lock<T, F>(
    conn: &PgConnection,
    key: LockKey,
    deadline: Instant,
    func: F,
) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error>,
{
    let (class, id) = key.advisory_keys();
    let millis = millis_until(deadline)?;
    let _ = sql_query(format!("SET statement_timeout = {}", millis)).execute(conn)?;
    let locked = sql_query("SELECT pg_advisory_lock($1, $2)")
        .bind::<Integer, _>(class)
        .bind::<Integer, _>(id)
        .execute(conn);
    let reset = sql_query("RESET statement_timeout").execute(conn);
    let _ = locked?;
    let _guard = SessionLock { conn, class, id };
    let _ = reset?;
    func()
}

struct SessionLock<'a> {
    conn: &'a PgConnection,
    class: i32,
    id: i32,
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        let unlocked = sql_query("SELECT pg_advisory_unlock($1, $2)")
            .bind::<Integer, _>(self.class)
            .bind::<Integer, _>(self.id)
            .execute(self.conn);
        if let Err(err) = unlocked {
            warn!(
                "Couldn't release advisory lock ({}, {}): {}",
                self.class, self.id, err
            );
        }
    }
}

impl Repo for PgConnection {
    fn create_user(&self, name: &str) -> Fallible<User> {
        insert_into(users::table)
            .values(users::name.eq(name))
            .get_result(self)
            .map_err(Into::into)
    }

    fn find_user(&self, user: UserId) -> Fallible<Option<User>> {
        users::table
            .find(user)
            .get_result(self)
            .optional()
            .map_err(Into::into)
    }

    fn create_group(&self, name: &str, owner: UserId, now: DateTime<Utc>) -> Fallible<Group> {
        insert_into(groups::table)
            .values((
                groups::id.eq(Uuid::new_v4()),
                groups::name.eq(name),
                groups::ownerid.eq(owner),
                groups::created.eq(now),
            ))
            .get_result(self)
            .map_err(Into::into)
    }

    fn find_group(&self, group: GroupId) -> Fallible<Option<Group>> {
        groups::table
            .find(group)
            .get_result(self)
            .optional()
            .map_err(Into::into)
    }

    fn rename_group(&self, group: GroupId, name: &str) -> Fallible<Group> {
        update(groups::table.find(group))
            .set(groups::name.eq(name))
            .get_result(self)
            .map_err(Into::into)
    }

    fn delete_group(&self, group: GroupId) -> Fallible<()> {
        // Invites, categories, and ledger entries go with it via ON DELETE CASCADE.
        let deleted = delete(groups::table.find(group)).execute(self)?;
        if deleted == 0 {
            bail!("Group {} does not exist", group);
        }
        Ok(())
    }

    fn set_user_group(&self, user: UserId, group: GroupId) -> Fallible<()> {
        let updated = update(users::table.find(user))
            .set(users::groupid.eq(Some(group)))
            .execute(self)?;
        if updated == 0 {
            bail!("User {} does not exist", user);
        }
        Ok(())
    }

    fn count_members(&self, group: GroupId) -> Fallible<i64> {
        users::table
            .filter(users::groupid.eq(group))
            .count()
            .get_result(self)
            .map_err(Into::into)
    }

    fn list_members(&self, group: GroupId) -> Fallible<Vec<User>> {
        users::table
            .filter(users::groupid.eq(group))
            .order(users::id)
            .load(self)
            .map_err(Into::into)
    }

    fn user_groups(&self, user: UserId) -> Fallible<Option<UserGroups>> {
        let current = users::table
            .find(user)
            .select(users::groupid)
            .get_result::<Option<Uuid>>(self)
            .optional()?;
        let current = match current {
            Some(current) => current,
            None => return Ok(None),
        };
        let owned = groups::table
            .filter(groups::ownerid.eq(user))
            .select(groups::id)
            .load(self)?;
        Ok(Some(UserGroups { current, owned }))
    }

    fn create_invite(
        &self,
        group: GroupId,
        created_by: UserId,
        code: &str,
        expires: DateTime<Utc>,
    ) -> Fallible<GroupInvite> {
        insert_into(group_invites::table)
            .values((
                group_invites::id.eq(Uuid::new_v4()),
                group_invites::groupid.eq(group),
                group_invites::code.eq(code),
                group_invites::createdby.eq(created_by),
                group_invites::expires.eq(expires),
            ))
            .get_result(self)
            .map_err(Into::into)
    }

    fn delete_non_expired_invites(&self, group: GroupId, now: DateTime<Utc>) -> Fallible<usize> {
        delete(
            group_invites::table
                .filter(group_invites::groupid.eq(group))
                .filter(group_invites::expires.ge(now)),
        )
        .execute(self)
        .map_err(Into::into)
    }

    fn find_invite_by_code(&self, code: &str) -> Fallible<Option<GroupInvite>> {
        group_invites::table
            .filter(group_invites::code.eq(code))
            .get_result(self)
            .optional()
            .map_err(Into::into)
    }

    fn delete_invite(&self, invite: InviteId) -> Fallible<usize> {
        delete(group_invites::table.find(invite))
            .execute(self)
            .map_err(Into::into)
    }

    fn delete_expired_invites(&self, now: DateTime<Utc>) -> Fallible<usize> {
        delete(group_invites::table.filter(group_invites::expires.lt(now)))
            .execute(self)
            .map_err(Into::into)
    }
}

impl Seeder for DB {
    fn seed_default_categories(&self, group: GroupId, creator: UserId) -> Fallible<()> {
        let conn = self.pool.get()?;
        let rows = DEFAULT_CATEGORIES
            .iter()
            .map(|&(name, kind)| {
                (
                    categories::id.eq(Uuid::new_v4()),
                    categories::groupid.eq(group),
                    categories::name.eq(name),
                    categories::kind.eq(kind.as_str()),
                    categories::createdby.eq(creator),
                )
            })
            .collect::<Vec<_>>();
        let inserted = insert_into(categories::table)
            .values(&rows)
            .on_conflict_do_nothing()
            .execute(&*conn)?;
        debug!("Seeded {} categories for group {}", inserted, group);
        Ok(())
    }
}
