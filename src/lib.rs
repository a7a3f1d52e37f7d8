//! ledgergroups
//! ============
//!
//! Group membership and invitations for a shared household ledger.
//!
//! Every user belongs to exactly one group at a time. They get a personal group when they sign
//! up, and move between groups by creating one, joining one with an invite code, or leaving the
//! one they're in.
//!
//! Hacking
//! -------
//!
//! This follows the approach laid out in
//! ["Stateless MVC"](https://www.tedinski.com/2018/09/11/stateless-mvc.html). Ignore the "Should
//! you use this design?" section...
#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    // unused_qualifications,
    while_true
)]
#![warn(missing_debug_implementations, missing_docs, unused_results)]

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

pub mod config;
pub mod dal;
pub mod error;
pub mod logic;
pub mod schema;
pub mod util;
pub mod view;
