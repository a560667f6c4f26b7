use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::{Error, Result};

const SQL_SPACE: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const SQL_SPACE_SUBSEC: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]");
const SQL_T: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const SQL_T_SUBSEC: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
const CLOCK: &[FormatItem<'static>] = format_description!("[hour repr:24]:[minute]");

/// The moment a message was created.
///
/// Backends report either RFC 3339 or SQL-style wall-clock timestamps.  Values
/// with an offset are shown in the local offset.  Values without one are kept
/// as wall-clock readings and shown exactly as the backend stored them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    datetime: OffsetDateTime,
    wall_clock: bool,
}

impl Timestamp {
    /// Wrap an existing date-time.
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self {
            datetime,
            wall_clock: false,
        }
    }

    /// A reading with no offset.  It is stored as UTC and never converted.
    pub fn from_wall_clock(datetime: PrimitiveDateTime) -> Self {
        Self {
            datetime: datetime.assume_utc(),
            wall_clock: true,
        }
    }

    /// The current time in the local offset, or UTC when the local offset is
    /// unavailable.
    pub fn now() -> Self {
        Self::new(OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()))
    }

    /// Parse any of the accepted timestamp formats.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Ok(datetime) = OffsetDateTime::parse(text, &Rfc3339) {
            return Ok(Self::new(datetime));
        }
        for format in [SQL_SPACE, SQL_SPACE_SUBSEC, SQL_T, SQL_T_SUBSEC] {
            if let Ok(datetime) = PrimitiveDateTime::parse(text, format) {
                return Ok(Self::from_wall_clock(datetime));
            }
        }
        Err(Error::validation(
            format!("unrecognized timestamp: {text:?}"),
            Some("created_at".to_string()),
        ))
    }

    /// Zero-padded 24-hour `HH:MM` in local time.
    pub fn clock(&self) -> String {
        self.clock_in(local_offset())
    }

    /// Zero-padded 24-hour `HH:MM` at `offset`.  Wall-clock readings ignore
    /// the offset.
    pub fn clock_in(&self, offset: UtcOffset) -> String {
        let datetime = if self.wall_clock {
            self.datetime
        } else {
            self.datetime.to_offset(offset)
        };
        datetime
            .format(CLOCK)
            .unwrap_or_else(|_| format!("{:02}:{:02}", datetime.hour(), datetime.minute()))
    }

    /// True when the backend reported no offset.
    pub fn is_wall_clock(&self) -> bool {
        self.wall_clock
    }

    /// The underlying date-time.  Wall-clock readings carry a UTC offset.
    pub fn datetime(&self) -> OffsetDateTime {
        self.datetime
    }

    fn format(&self) -> std::result::Result<String, time::error::Format> {
        if !self.wall_clock {
            return self.datetime.format(&Rfc3339);
        }
        let format = if self.datetime.nanosecond() == 0 {
            SQL_T
        } else {
            SQL_T_SUBSEC
        };
        self.datetime.format(format)
    }
}

fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}", self.datetime),
        }
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(datetime: OffsetDateTime) -> Self {
        Self::new(datetime)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = self.format().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&s)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse(&s).map_err(serde::de::Error::custom)
    }
}
