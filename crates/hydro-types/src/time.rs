// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in time within a single calendar day, resolution one second.
///
/// Stored as seconds since local midnight, always in `[0, SECONDS_PER_DAY)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u32);

/// Error returned when a `TimeOfDay` literal cannot be parsed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid time of day: {0}")]
pub struct TimeOfDayParseError(pub String);

impl TimeOfDay {
    pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    /// Construct from a seconds-since-midnight offset. Returns `None` if out of range.
    pub fn from_seconds(seconds: u32) -> Option<Self> {
        if seconds < Self::SECONDS_PER_DAY {
            Some(Self(seconds))
        } else {
            None
        }
    }

    pub fn from_hms(h: u32, m: u32, s: u32) -> Option<Self> {
        if h >= 24 || m >= 60 || s >= 60 {
            return None;
        }
        Self::from_seconds(h * 3600 + m * 60 + s)
    }

    pub fn seconds(&self) -> u32 {
        self.0
    }

    /// Parse `HH:MM`, `Hpm`/`Ham`, or `H:MMpm`/`H:MMam`, case-insensitively.
    pub fn parse(input: &str) -> Result<Self, TimeOfDayParseError> {
        let s = input.trim();
        let lower = s.to_ascii_lowercase();
        let err = || TimeOfDayParseError(input.to_string());

        if let Some(stripped) = lower.strip_suffix("am").or_else(|| lower.strip_suffix("pm")) {
            let is_pm = lower.ends_with("pm");
            let stripped = stripped.trim();
            let (h_str, m_str) = match stripped.split_once(':') {
                Some((h, m)) => (h, m),
                None => (stripped, "0"),
            };
            let mut h: u32 = h_str.parse().map_err(|_| err())?;
            let m: u32 = m_str.parse().map_err(|_| err())?;
            if h == 0 || h > 12 {
                return Err(err());
            }
            if h == 12 {
                h = 0;
            }
            let h24 = if is_pm { h + 12 } else { h };
            return Self::from_hms(h24, m, 0).ok_or_else(err);
        }

        // 24-hour HH:MM
        let (h_str, m_str) = lower.split_once(':').ok_or_else(err)?;
        let h: u32 = h_str.parse().map_err(|_| err())?;
        let m: u32 = m_str.parse().map_err(|_| err())?;
        Self::from_hms(h, m, 0).ok_or_else(err)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 3600, (self.0 % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_24h() {
        assert_eq!(TimeOfDay::parse("14:30").unwrap(), TimeOfDay::from_hms(14, 30, 0).unwrap());
        assert_eq!(TimeOfDay::parse("00:00").unwrap(), TimeOfDay::MIDNIGHT);
    }

    #[test]
    fn parses_am_pm() {
        assert_eq!(TimeOfDay::parse("2pm").unwrap(), TimeOfDay::from_hms(14, 0, 0).unwrap());
        assert_eq!(TimeOfDay::parse("2:30pm").unwrap(), TimeOfDay::from_hms(14, 30, 0).unwrap());
        assert_eq!(TimeOfDay::parse("11am").unwrap(), TimeOfDay::from_hms(11, 0, 0).unwrap());
        assert_eq!(TimeOfDay::parse("12am").unwrap(), TimeOfDay::MIDNIGHT);
        assert_eq!(TimeOfDay::parse("12pm").unwrap(), TimeOfDay::from_hms(12, 0, 0).unwrap());
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(TimeOfDay::parse("2PM").unwrap(), TimeOfDay::parse("2pm").unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(TimeOfDay::parse("25:00").is_err());
        assert!(TimeOfDay::parse("13pm").is_err());
        assert!(TimeOfDay::parse("not a time").is_err());
    }

    #[test]
    fn display_round_trips_24h() {
        let t = TimeOfDay::from_hms(7, 5, 0).unwrap();
        assert_eq!(t.to_string(), "07:05");
    }
}
