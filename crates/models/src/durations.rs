use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

lazy_static! {
    // Accepted period syntax: a bare integer is seconds, and a suffixed
    // integer may use s|m|h|d. Anything broader (weeks, "1h 30m") is
    // rejected so that configurations stay portable.
    static ref PERIOD_RE: Regex = Regex::new(r"^[0-9]+(s|m|h|d)$").unwrap();
}

#[derive(thiserror::Error, Debug)]
#[error("{value:?} is not a valid time period (use seconds, or an integer suffixed with s|m|h|d)")]
pub struct DurationError {
    pub value: String,
}

/// TimePeriod is an unsigned duration: `retry_delay`, `time_modulus`, and
/// any other place the configuration accepts a period of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePeriod(Duration);

impl TimePeriod {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn to_std(&self) -> Duration {
        self.0
    }
}

impl FromStr for TimePeriod {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            let secs = s.parse::<u64>().map_err(|_| DurationError {
                value: s.to_string(),
            })?;
            return Ok(Self(Duration::from_secs(secs)));
        }
        if !PERIOD_RE.is_match(s) {
            return Err(DurationError {
                value: s.to_string(),
            });
        }
        humantime::parse_duration(s)
            .map(Self)
            .map_err(|_| DurationError {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        humantime::format_duration(self.0).fmt(f)
    }
}

impl Serialize for TimePeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.as_secs())
    }
}

impl<'de> Deserialize<'de> for TimePeriod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(secs) if secs >= 0 => Ok(Self(Duration::from_secs(secs as u64))),
            RawDuration::Seconds(secs) => Err(serde::de::Error::custom(DurationError {
                value: secs.to_string(),
            })),
            RawDuration::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// TimeShift is a signed duration: the `time_offset` modifier, which may
/// move a frame's timestamp backwards with a leading `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeShift(chrono::Duration);

impl TimeShift {
    pub fn from_secs(secs: i64) -> Self {
        Self(chrono::Duration::seconds(secs))
    }

    pub fn delta(&self) -> chrono::Duration {
        self.0
    }
}

impl FromStr for TimeShift {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(body) => (true, body),
            None => (false, trimmed),
        };

        let period: TimePeriod = body.parse().map_err(|_| DurationError {
            value: s.to_string(),
        })?;
        let delta = chrono::Duration::from_std(period.to_std()).map_err(|_| DurationError {
            value: s.to_string(),
        })?;

        Ok(Self(if negative { -delta } else { delta }))
    }
}

impl fmt::Display for TimeShift {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let secs = self.0.num_seconds();
        if secs < 0 {
            write!(f, "-{}", humantime::format_duration(Duration::from_secs(-secs as u64)))
        } else {
            humantime::format_duration(Duration::from_secs(secs as u64)).fmt(f)
        }
    }
}

impl Serialize for TimeShift {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0.num_seconds())
    }
}

impl<'de> Deserialize<'de> for TimeShift {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(secs) => Ok(Self::from_secs(secs)),
            RawDuration::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(i64),
    Text(String),
}
