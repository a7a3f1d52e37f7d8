//! Issuing and checking invite codes.

use crate::{
    config::Settings,
    dal::{Isolation, LockKey, Repo, Store},
    error::Error,
    logic::code,
    schema::{GroupId, GroupInvite, InviteStatus, IssuedInvite, UserId},
    util::Clock,
};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// The invitation service. Each group has at most one live invite; issuing a new one replaces it.
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct Invitations<S> {
    store: S,
    clock: Arc<dyn Clock>,
    settings: Arc<Settings>,
    timeout: Duration,
}

impl<S: Store> Invitations<S> {
    /// Creates the service.
    pub fn new(store: S, clock: Arc<dyn Clock>, settings: Arc<Settings>) -> Invitations<S> {
        let timeout = settings.transition_timeout;
        Invitations {
            store,
            clock,
            settings,
            timeout,
        }
    }

    /// Returns a copy of the service whose operations must finish within `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Invitations<S> {
        Invitations {
            timeout,
            ..self.clone()
        }
    }

    /// Issues a new invite for a group, replacing any live one. Only the group's owner may do
    /// this.
    pub fn issue(&self, group: GroupId, requester: UserId) -> Result<IssuedInvite, Error> {
        let now = self.clock.now();
        let expires = now + self.settings.invite_ttl;
        let code = code::generate();

        let superseded = self.store.transact(
            Isolation::ReadCommitted,
            Some(LockKey::Group(group)),
            self.deadline(),
            |conn| {
                let found = conn.find_group(group)?.ok_or(Error::NotFound("group"))?;
                if found.owner != requester {
                    return Err(Error::Forbidden);
                }
                let superseded = conn.delete_non_expired_invites(group, now)?;
                let _ = conn.create_invite(group, requester, &code, expires)?;
                Ok(superseded)
            },
        )?;

        info!(
            "User {} issued an invite to group {}, replacing {} live invite(s)",
            requester, group, superseded
        );
        Ok(IssuedInvite {
            url: self.settings.join_url(&code),
            code,
            expires,
        })
    }

    /// Checks whether an invite code can currently be used, and what group it leads to. An
    /// expired invite is deleted as a side effect.
    pub fn validate(&self, code: &str) -> Result<InviteStatus, Error> {
        let code = code::normalize(code);
        if !code::is_well_formed(&code) {
            return Ok(InviteStatus {
                group: None,
                valid: false,
            });
        }

        let now = self.clock.now();
        self.store
            .transact(Isolation::ReadCommitted, None, self.deadline(), |conn| {
                let invite = match conn.find_invite_by_code(&code)? {
                    Some(invite) => invite,
                    None => {
                        return Ok(InviteStatus {
                            group: None,
                            valid: false,
                        })
                    }
                };
                if is_expired(&invite, now) {
                    // Somebody else may have beaten us to it, which is fine.
                    let deleted = conn.delete_invite(invite.id)?;
                    debug!("Deleted {} expired invite(s) with code {}", deleted, code);
                    return Ok(InviteStatus {
                        group: Some(invite.group),
                        valid: false,
                    });
                }
                Ok(InviteStatus {
                    group: Some(invite.group),
                    valid: true,
                })
            })
    }

    /// Deletes every expired invite, returning how many there were.
    pub fn purge_expired(&self) -> Result<usize, Error> {
        let now = self.clock.now();
        let purged = self
            .store
            .transact(Isolation::ReadCommitted, None, self.deadline(), |conn| {
                conn.delete_expired_invites(now).map_err(Error::from)
            })?;
        info!("Purged {} expired invite(s)", purged);
        Ok(purged)
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }
}

/// Looks up a live invite inside an existing transaction, without any side effects.
pub(crate) fn resolve<C: Repo>(
    conn: &C,
    code: &str,
    now: DateTime<Utc>,
) -> Result<GroupInvite, Error> {
    let invite = conn
        .find_invite_by_code(code)?
        .ok_or(Error::NotFound("invite"))?;
    if is_expired(&invite, now) {
        return Err(Error::Expired);
    }
    Ok(invite)
}

fn is_expired(invite: &GroupInvite, now: DateTime<Utc>) -> bool {
    now > invite.expires
}
