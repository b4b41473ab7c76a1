//! In-world clock.
//!
//! The world document stores an absolute naive timestamp; every turn the
//! model reports how much time passed and the clock is advanced by that
//! signed delta. No timezone handling.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{LogposeError, Result};
use crate::types::{WorldSection, lenient_i64};

/// Canonical storage format of `world.current_time`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Clock value of a freshly created world.
pub const DEFAULT_START_TIME: &str = "1520-01-01 08:00:00";

/// Elapsed in-world time reported by a directive. Absent fields are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TimePassed {
    /// Whole days.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub days: i64,
    /// Whole hours.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub hours: i64,
    /// Whole minutes.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub minutes: i64,
}

impl TimePassed {
    /// Build a delta.
    #[must_use]
    pub fn new(days: i64, hours: i64, minutes: i64) -> Self {
        Self { days, hours, minutes }
    }

    /// Whether the delta moves the clock at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.days == 0 && self.hours == 0 && self.minutes == 0
    }

    /// Convert to a signed duration.
    ///
    /// # Errors
    /// Returns [`LogposeError::TimeOverflow`] when the delta is out of range.
    pub fn to_delta(&self) -> Result<TimeDelta> {
        let overflow = || LogposeError::TimeOverflow {
            days: self.days,
            hours: self.hours,
            minutes: self.minutes,
        };
        let days = TimeDelta::try_days(self.days).ok_or_else(overflow)?;
        let hours = TimeDelta::try_hours(self.hours).ok_or_else(overflow)?;
        let minutes = TimeDelta::try_minutes(self.minutes).ok_or_else(overflow)?;
        days.checked_add(&hours)
            .and_then(|d| d.checked_add(&minutes))
            .ok_or_else(overflow)
    }
}

/// Parse a stored timestamp, rejecting anything but the canonical format.
///
/// # Errors
/// Returns [`LogposeError::MalformedTimestamp`] on mismatch.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let malformed = || LogposeError::MalformedTimestamp {
        value: value.to_string(),
    };
    let parsed = NaiveDateTime::parse_from_str(value, TIME_FORMAT).map_err(|_| malformed())?;
    // chrono accepts unpadded fields; the stored form must be exact.
    if format_timestamp(&parsed) != value {
        return Err(malformed());
    }
    Ok(parsed)
}

/// Render a timestamp in the canonical format.
#[must_use]
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

/// Advance `world.current_time` by `passed` and return the new time.
///
/// The world is only written when the whole computation succeeds.
///
/// # Errors
/// Returns [`LogposeError::MalformedTimestamp`] if the stored clock is not
/// canonical, or [`LogposeError::TimeOverflow`] if the result is out of range.
pub fn advance(world: &mut WorldSection, passed: &TimePassed) -> Result<NaiveDateTime> {
    let current = parse_timestamp(&world.current_time)?;
    let next = current
        .checked_add_signed(passed.to_delta()?)
        .ok_or(LogposeError::TimeOverflow {
            days: passed.days,
            hours: passed.hours,
            minutes: passed.minutes,
        })?;
    world.current_time = format_timestamp(&next);
    Ok(next)
}
