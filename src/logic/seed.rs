//! Default categories for new groups.
//!
//! Seeding happens after a transition has committed, and is allowed to fail; a group without its
//! default categories is still a perfectly good group, and users can add them by hand.

use crate::schema::{CategoryKind, GroupId, UserId};
use failure::Fallible;
use std::sync::Arc;

/// The categories every new group starts with.
pub const DEFAULT_CATEGORIES: &[(&str, CategoryKind)] = &[
    ("Food", CategoryKind::Expense),
    ("Transportation", CategoryKind::Expense),
    ("Housing", CategoryKind::Expense),
    ("Utilities", CategoryKind::Expense),
    ("Medical", CategoryKind::Expense),
    ("Education", CategoryKind::Expense),
    ("Hobbies", CategoryKind::Expense),
    ("Shopping", CategoryKind::Expense),
    ("Other", CategoryKind::Expense),
    ("Salary", CategoryKind::Income),
    ("Allowance", CategoryKind::Income),
    ("Investments", CategoryKind::Income),
    ("Other income", CategoryKind::Income),
    ("Account transfer", CategoryKind::Transfer),
];

/// Something that can give a group its default categories.
pub trait Seeder: Send + Sync {
    /// Creates the default categories for a group. Must be safe to call more than once for the
    /// same group.
    fn seed_default_categories(&self, group: GroupId, creator: UserId) -> Fallible<()>;
}

impl<T: Seeder + ?Sized> Seeder for Arc<T> {
    fn seed_default_categories(&self, group: GroupId, creator: UserId) -> Fallible<()> {
        (**self).seed_default_categories(group, creator)
    }
}
