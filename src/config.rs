//! Runtime settings for the membership engine.

use chrono::Duration;
use std::time::Duration as StdDuration;

/// Settings shared by the membership engine and the invitation service.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The URL the frontend is served from; invite URLs are built on top of it.
    pub base_url: String,

    /// How long an invite code stays valid after it is issued.
    pub invite_ttl: Duration,

    /// How long a single transition may take before it is rolled back.
    pub transition_timeout: StdDuration,
}

impl Settings {
    /// Builds the URL an invitee can follow to join with the given code.
    pub fn join_url(&self, code: &str) -> String {
        format!("{}/groups/join?code={}", self.base_url.trim_end_matches('/'), code)
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            base_url: "http://localhost:3000".to_string(),
            invite_ttl: Duration::hours(24),
            transition_timeout: StdDuration::from_millis(5000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn join_url_ignores_trailing_slash() {
        let settings = Settings {
            base_url: "https://ledger.example/".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.join_url("ABCDE12345"),
            "https://ledger.example/groups/join?code=ABCDE12345"
        );
    }
}
