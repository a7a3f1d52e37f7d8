//! The errors membership operations can end in.

use diesel::r2d2::PoolError;
use failure::Fail;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tokio_threadpool::BlockingError;

/// An error from a membership or invitation operation.
///
/// Everything except `Storage` and `TimedOut` is an expected outcome the caller should turn into a
/// message for the user. Those two mean the infrastructure failed, and the operation was rolled
/// back in its entirety.
#[derive(Debug)]
pub enum Error {
    /// The named thing (a user, group, or invite) does not exist.
    NotFound(&'static str),

    /// The requester is not allowed to do this; usually because they don't own the group.
    Forbidden,

    /// The requester's membership doesn't allow this right now.
    InvalidState(String),

    /// The invite existed, but its time ran out.
    Expired,

    /// A group name was rejected.
    InvalidName(String),

    /// The operation's deadline passed before it could commit.
    TimedOut,

    /// The database failed.
    Storage(failure::Error),
}

impl Error {
    /// Whether this is a business-rule outcome rather than an infrastructure failure.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Storage(_) | Error::TimedOut => false,
            _ => true,
        }
    }
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            Error::NotFound(what) => write!(fmt, "No such {}", what),
            Error::Forbidden => write!(fmt, "Only the group's owner may do that"),
            Error::InvalidState(msg) => write!(fmt, "{}", msg),
            Error::Expired => write!(fmt, "The invite code has expired"),
            Error::InvalidName(msg) => write!(fmt, "Invalid group name: {}", msg),
            Error::TimedOut => write!(fmt, "The operation timed out and was rolled back"),
            Error::Storage(err) => write!(fmt, "Storage error: {}", err),
        }
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        match self {
            Error::Storage(err) => Some(err.as_fail()),
            _ => None,
        }
    }
}

impl From<failure::Error> for Error {
    fn from(err: failure::Error) -> Error {
        Error::Storage(err)
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Error {
        Error::Storage(err.into())
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Error {
        Error::Storage(err.into())
    }
}

impl From<BlockingError> for Error {
    fn from(err: BlockingError) -> Error {
        Error::Storage(err.into())
    }
}
