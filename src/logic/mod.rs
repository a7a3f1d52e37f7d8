//! Business logic.
//!
//! > **Logic** is the "business (or domain) logic" of the application. The CLI will pull the
//! > necessary information out of its arguments, and call into this module as quickly as
//! > possible to do all the actual work.

pub mod code;
pub mod invite;
pub mod membership;
pub mod seed;

pub use crate::logic::{invite::Invitations, membership::Membership};
use crate::{
    dal::Store,
    error::Error,
    schema::{Group, GroupId, InviteStatus, IssuedInvite, UserId},
    util::blocking,
};
use futures::Future;

/// The membership engine, with every operation wrapped up as a future. The database calls
/// underneath are still synchronous, so these futures must be run inside a Tokio threadpool.
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct Service<S> {
    membership: Membership<S>,
}

impl<S: Store> Service<S> {
    /// Wraps an engine.
    pub fn new(membership: Membership<S>) -> Service<S> {
        Service { membership }
    }

    /// Runs an arbitrary engine operation on the blocking pool.
    pub fn run<F, T>(&self, func: F) -> impl Future<Item = T, Error = Error>
    where
        F: FnOnce(&Membership<S>) -> Result<T, Error>,
    {
        let membership = self.membership.clone();
        blocking(move || func(&membership))
    }

    /// See `Membership::provision_on_signup`.
    pub fn provision_on_signup(
        &self,
        user: UserId,
        display_name: String,
    ) -> impl Future<Item = Group, Error = Error> {
        self.run(move |m| m.provision_on_signup(user, &display_name))
    }

    /// See `Membership::create_group`.
    pub fn create_group(
        &self,
        requester: UserId,
        name: String,
    ) -> impl Future<Item = Group, Error = Error> {
        self.run(move |m| m.create_group(requester, &name))
    }

    /// See `Membership::join_group`.
    pub fn join_group(
        &self,
        requester: UserId,
        invite_code: String,
    ) -> impl Future<Item = Group, Error = Error> {
        self.run(move |m| m.join_group(requester, &invite_code))
    }

    /// See `Membership::leave_group`.
    pub fn leave_group(
        &self,
        requester: UserId,
        group: GroupId,
    ) -> impl Future<Item = Group, Error = Error> {
        self.run(move |m| m.leave_group(requester, group))
    }

    /// See `Invitations::issue`.
    pub fn issue_invite(
        &self,
        group: GroupId,
        requester: UserId,
    ) -> impl Future<Item = IssuedInvite, Error = Error> {
        self.run(move |m| m.invitations().issue(group, requester))
    }

    /// See `Invitations::validate`.
    pub fn validate_invite(&self, code: String) -> impl Future<Item = InviteStatus, Error = Error> {
        self.run(move |m| m.invitations().validate(&code))
    }
}
