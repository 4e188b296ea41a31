use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use chrono_tz::Tz;
use log::error;
use serde::Serialize;

use crate::timezone::model::TimezoneTable;

pub const PLACEHOLDER_TIME: &str = "--:--:--";
pub const PLACEHOLDER_DATE: &str = "--/--/----";
pub const ERROR_TEXT: &str = "Error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedMoment {
    pub time: String,
    pub date: String,
}

impl FormattedMoment {
    pub fn placeholder() -> Self {
        Self {
            time: PLACEHOLDER_TIME.to_string(),
            date: PLACEHOLDER_DATE.to_string(),
        }
    }

    pub fn error() -> Self {
        Self {
            time: ERROR_TEXT.to_string(),
            date: ERROR_TEXT.to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.time == PLACEHOLDER_TIME && self.date == PLACEHOLDER_DATE
    }

    pub fn is_error(&self) -> bool {
        self.time == ERROR_TEXT && self.date == ERROR_TEXT
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimeDisplayMode {
    Hour24,
    Hour12,
}

impl TimeDisplayMode {
    pub fn from_24h_flag(is_24_hour: bool) -> Self {
        if is_24_hour {
            TimeDisplayMode::Hour24
        } else {
            TimeDisplayMode::Hour12
        }
    }
}

/// Formats instants against the session timezone table.
///
/// Never fails: an index the table does not know yields the placeholder
/// moment, and a zone that cannot be resolved yields the error moment.
#[derive(Debug, Clone, Copy)]
pub struct TimeFormatter<'a> {
    table: &'a TimezoneTable,
}

impl<'a> TimeFormatter<'a> {
    pub fn new(table: &'a TimezoneTable) -> Self {
        Self { table }
    }

    pub fn format(
        &self,
        unix_timestamp: i64,
        timezone_index: u32,
        is_24_hour: bool,
    ) -> FormattedMoment {
        let Some(entry) = self.table.get(timezone_index) else {
            return FormattedMoment::placeholder();
        };
        let mode = TimeDisplayMode::from_24h_flag(is_24_hour);
        match format_in_named_zone(unix_timestamp, &entry.iana_name, mode) {
            Ok(moment) => moment,
            Err(err) => {
                error!(
                    "failed to format time for timezone {}: {err:#}",
                    entry.iana_name
                );
                FormattedMoment::error()
            }
        }
    }

    /// Resolved zone for an index, if the index is known and its name parses.
    pub fn zone(&self, timezone_index: u32) -> Option<Tz> {
        let entry = self.table.get(timezone_index)?;
        parse_zone(&entry.iana_name).ok()
    }
}

pub fn parse_zone(iana_name: &str) -> Result<Tz> {
    iana_name
        .parse::<Tz>()
        .map_err(|err| anyhow!("unknown IANA timezone '{iana_name}': {err}"))
}

pub fn format_in_named_zone(
    unix_timestamp: i64,
    iana_name: &str,
    mode: TimeDisplayMode,
) -> Result<FormattedMoment> {
    let zone = parse_zone(iana_name)?;
    let utc = DateTime::from_timestamp(unix_timestamp, 0)
        .ok_or_else(|| anyhow!("timestamp {unix_timestamp} is out of range"))?;
    let local = utc.with_timezone(&zone);
    Ok(FormattedMoment {
        time: format_clock(&local, mode),
        date: format_date(&local),
    })
}

pub fn format_clock<Z: TimeZone>(dt: &DateTime<Z>, mode: TimeDisplayMode) -> String {
    match mode {
        TimeDisplayMode::Hour24 => format!(
            "{:02}:{:02}:{:02}",
            dt.hour(),
            dt.minute(),
            dt.second()
        ),
        TimeDisplayMode::Hour12 => {
            let (is_pm, hour12) = dt.hour12();
            let meridiem = if is_pm { "PM" } else { "AM" };
            format!(
                "{:02}:{:02}:{:02} {}",
                hour12,
                dt.minute(),
                dt.second(),
                meridiem
            )
        }
    }
}

pub fn format_date<Z: TimeZone>(dt: &DateTime<Z>) -> String {
    format!("{:02}/{:02}/{:04}", dt.month(), dt.day(), dt.year())
}
