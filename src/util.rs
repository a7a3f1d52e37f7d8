//! Various utilities.

use antidote::Mutex;
use chrono::{DateTime, Duration, Utc};
use futures::{future::poll_fn, Async, Future};
use log::error;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tokio_threadpool::BlockingError;

/// Logs an error, including its causes and backtrace (if possible).
pub fn log_err(err: &failure::Error) {
    let mut first = true;
    let num_errs = err.iter_chain().count();
    if num_errs <= 1 {
        error!("{}", err);
    } else {
        for cause in err.iter_chain() {
            if first {
                first = false;
                error!("           {}", cause);
            } else {
                error!("caused by: {}", cause);
            }
        }
    }
    let bt = err.backtrace().to_string();
    if bt != "" {
        error!("{}", bt);
    }
}

/// Runs a blocking function as a future. The future must be run inside a Tokio threadpool, which
/// gets told that the current worker is about to block, so it can hand its other work off.
pub fn blocking<E, F, T>(func: F) -> impl Future<Item = T, Error = E>
where
    E: From<BlockingError>,
    F: FnOnce() -> Result<T, E>,
{
    let mut func = Some(func);
    poll_fn(move || {
        match tokio_threadpool::blocking(|| func.take().map(|func| func()))? {
            Async::Ready(Some(r)) => r.map(Async::Ready),
            Async::Ready(None) => panic!("blocking future polled after completion"),
            Async::NotReady => Ok(Async::NotReady),
        }
    })
}

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system's wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock stopped at the given time.
    pub fn new(now: DateTime<Utc>) -> ManualClock {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forwards (or backwards, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

impl Debug for ManualClock {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("ManualClock")
            .field("now", &*self.now.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ManualClock};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let start = Utc.ymd(2024, 1, 1).and_hms(0, 0, 0);
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::hours(24));
        assert_eq!(clock.now(), Utc.ymd(2024, 1, 2).and_hms(0, 0, 0));
    }
}
