//! Invite codes.
//!
//! Codes are short enough to type by hand, and carry no information; the only thing making them
//! hard to guess is that they're drawn from the OS's CSPRNG.

use rand::{distributions::Uniform, rngs::OsRng, Rng};

/// The number of characters in a code.
pub const CODE_LEN: usize = 10;

/// The characters a code is made of.
pub const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a fresh invite code.
pub fn generate() -> String {
    let dist = Uniform::from(0..ALPHABET.len());
    OsRng
        .sample_iter(dist)
        .take(CODE_LEN)
        .map(|i| ALPHABET[i] as char)
        .collect()
}

/// Checks that a code could have come from `generate`. This says nothing about whether it was
/// ever actually issued.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| ALPHABET.contains(&b))
}

/// Cleans up a code as typed by a user.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
