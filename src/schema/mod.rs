//! Types used throughout.
//!
//! > Schema defines the plain old data types that views operate on. Notably, the schema module has
//! > no knowledge of the database, nor any dependencies on any of the rest of the system.

use chrono::{DateTime, Utc};
use serde_derive::Serialize;
use uuid::Uuid;

/// The database ID of a user.
pub type UserId = i32;

/// The database ID of a group.
pub type GroupId = Uuid;

/// The database ID of an invite.
pub type InviteId = Uuid;

/// A user, as far as group membership is concerned.
#[derive(Clone, Debug, PartialEq, Queryable, Serialize)]
pub struct User {
    /// The user's database ID.
    pub id: UserId,

    /// The user's display name.
    pub name: String,

    /// The group the user currently belongs to. Only `None` while the user is being signed up.
    pub group: Option<GroupId>,
}

/// A group, i.e. one shared ledger.
#[derive(Clone, Debug, PartialEq, Queryable, Serialize)]
pub struct Group {
    /// The group's database ID.
    pub id: GroupId,

    /// The group's name.
    pub name: String,

    /// The user that owns the group.
    pub owner: UserId,

    /// When the group was created.
    pub created: DateTime<Utc>,
}

/// A pending invitation to join a group.
#[derive(Clone, Debug, PartialEq, Queryable, Serialize)]
pub struct GroupInvite {
    /// The invite's database ID.
    pub id: InviteId,

    /// The group the invite leads to.
    pub group: GroupId,

    /// The code handed out to invitees.
    pub code: String,

    /// The user that issued the invite.
    pub created_by: UserId,

    /// The instant after which the invite is no longer accepted.
    pub expires: DateTime<Utc>,
}

/// The kind of ledger entry a category applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryKind {
    /// Money going out.
    Expense,

    /// Money coming in.
    Income,

    /// Money moving between accounts.
    Transfer,
}

impl CategoryKind {
    /// The name stored in the `kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::Expense => "EXPENSE",
            CategoryKind::Income => "INCOME",
            CategoryKind::Transfer => "TRANSFER",
        }
    }
}

/// A ledger category scoped to a group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Category {
    /// The group the category belongs to.
    pub group: GroupId,

    /// The category's name, unique within its group.
    pub name: String,

    /// What the category applies to.
    pub kind: CategoryKind,

    /// The user the category was created for.
    pub created_by: UserId,
}

/// A user's role in a group. There is no admin role; admin-level actions are owner-only.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The user the group's `owner` field points at.
    Owner,

    /// Anyone else whose current group is the group.
    Member,
}

impl Role {
    /// Computes the role the given user has in the given group, assuming they are a member.
    pub fn of(group: &Group, user: UserId) -> Role {
        if group.owner == user {
            Role::Owner
        } else {
            Role::Member
        }
    }
}

/// A member of a group, with their computed role.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Member {
    /// The member's user ID.
    pub id: UserId,

    /// The member's display name.
    pub name: String,

    /// The member's role.
    pub role: Role,
}

/// A group together with its members.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupDetails {
    /// The group itself.
    pub group: Group,

    /// Everyone whose current group this is, ordered by user ID.
    pub members: Vec<Member>,
}

impl GroupDetails {
    /// Builds the details from a group and the users pointing at it.
    pub fn new(group: Group, users: Vec<User>) -> GroupDetails {
        let members = users
            .into_iter()
            .map(|user| Member {
                role: Role::of(&group, user.id),
                id: user.id,
                name: user.name,
            })
            .collect();
        GroupDetails { group, members }
    }

    /// The number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// A user's current group and the groups they own.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserGroups {
    /// The user's current group.
    pub current: Option<GroupId>,

    /// Every group whose owner is the user, whether or not they are still in it.
    pub owned: Vec<GroupId>,
}

/// A freshly issued invite, as handed back to the issuer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IssuedInvite {
    /// The invite code.
    pub code: String,

    /// A URL that lets the invitee join directly.
    pub url: String,

    /// When the code stops working.
    pub expires: DateTime<Utc>,
}

/// The result of checking an invite code.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct InviteStatus {
    /// The group the code pointed at, if the code was ever issued and still on record.
    pub group: Option<GroupId>,

    /// Whether the code can be used to join right now.
    pub valid: bool,
}
