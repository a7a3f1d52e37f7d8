//! Rendering results.
//!
//! > View is the only module that knows anything about HTML, or JSON, or other "renderings" of the
//! > response. I'm happy to call this "view" in common with traditional stateless MVC, because
//! > it's role is largely the same.

use crate::{error::Error, schema::IssuedInvite};
use chrono::{DateTime, Utc};
use chrono_humanize::HumanTime;
use failure::Fallible;
use serde::Serialize;
use serde_json::{json, Value};

/// Renders a value as pretty-printed JSON.
pub fn render<T: Serialize>(data: T) -> Fallible<String> {
    serde_json::to_string_pretty(&data).map_err(Into::into)
}

/// Renders a freshly issued invite, with its expiry also given relative to `now`.
pub fn render_invite(invite: &IssuedInvite, now: DateTime<Utc>) -> Fallible<String> {
    render(json!({
        "code": invite.code,
        "url": invite.url,
        "expires": invite.expires,
        "expiresIn": HumanTime::from(invite.expires - now).to_string(),
    }))
}

/// Renders a business-rule error for the user to read.
pub fn render_error(err: &Error) -> Value {
    let kind = match err {
        Error::NotFound(_) => "NOT_FOUND",
        Error::Forbidden => "FORBIDDEN",
        Error::InvalidState(_) => "INVALID_STATE",
        Error::Expired => "EXPIRED",
        Error::InvalidName(_) => "INVALID_NAME",
        Error::TimedOut => "TIMED_OUT",
        Error::Storage(_) => "STORAGE",
    };
    json!({
        "error": err.to_string(),
        "code": kind,
    })
}
