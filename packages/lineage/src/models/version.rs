use std::fmt;

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeDelta, Utc};

use crate::utils::filename::{VERSION_PREFIX_DIGITS, split_version_prefix};

/// Second-resolution timestamp used as the version prefix of a stored name.
///
/// Its fixed-width `YYYYMMDDHHMMSS` rendering sorts lexicographically in
/// chronological order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionStamp(NaiveDateTime);

impl VersionStamp {
    pub const FORMAT: &'static str = "%Y%m%d%H%M%S";

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.naive_utc().trunc_subsecs(0))
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Parses a bare 14-digit stamp.
    pub fn parse(digits: &str) -> Option<Self> {
        if digits.len() != VERSION_PREFIX_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveDateTime::parse_from_str(digits, Self::FORMAT)
            .ok()
            .map(Self)
    }

    /// The stamp carried by a stored name, if any.
    pub fn of_stored_name(stored_name: &str) -> Option<Self> {
        split_version_prefix(stored_name).0.and_then(Self::parse)
    }

    pub fn next_second(self) -> Self {
        Self(self.0 + TimeDelta::seconds(1))
    }

    /// Stamp for the version following `previous`: the current time, pushed
    /// forward when the previous stamp is not strictly older.
    pub fn successor(now: Self, previous: Option<Self>) -> Self {
        match previous {
            Some(prev) if prev >= now => prev.next_second(),
            _ => now,
        }
    }

    /// Stored name for `logical_name` at this stamp.
    pub fn stored_name(&self, logical_name: &str) -> String {
        format!("{self}_{logical_name}")
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}
