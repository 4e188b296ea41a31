use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike,
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::settings::{ClockSettings, LastDeparted};
use crate::timezone::formatter::{FormattedMoment, TimeFormatter};
use crate::timezone::model::TimezoneTable;

pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

/// One time-circuit row split into the fields the display shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderRow {
    pub month: String,
    pub day: String,
    pub year: String,
    pub hour: String,
    pub minute: String,
    pub second: String,
    pub meridiem: String,
}

impl HeaderRow {
    pub fn placeholder() -> Self {
        Self {
            month: "---".to_string(),
            day: "--".to_string(),
            year: "----".to_string(),
            hour: "--".to_string(),
            minute: "--".to_string(),
            second: "--".to_string(),
            meridiem: String::new(),
        }
    }

    pub fn from_moment(
        moment: &FormattedMoment,
        is_24_hour: bool,
        year_override: Option<&str>,
    ) -> Self {
        if moment.is_placeholder() || moment.is_error() {
            return Self::placeholder();
        }

        let (clock, meridiem) = match moment.time.split_once(' ') {
            Some((clock, meridiem)) => (clock, meridiem),
            None => (moment.time.as_str(), ""),
        };
        let mut clock_parts = clock.split(':');
        let hour = clock_parts.next().unwrap_or("--");
        let minute = clock_parts.next().unwrap_or("--");
        let second = clock_parts.next().unwrap_or("--");

        let mut date_parts = moment.date.split('/');
        let month = date_parts
            .next()
            .and_then(|text| text.parse::<usize>().ok())
            .and_then(|month| month.checked_sub(1))
            .and_then(|index| MONTH_ABBREVIATIONS.get(index))
            .copied()
            .unwrap_or("---");
        let day = date_parts.next().unwrap_or("--");
        let year = date_parts.next().unwrap_or("----");

        Self {
            month: month.to_string(),
            day: day.to_string(),
            year: year_override.unwrap_or(year).to_string(),
            hour: hour.to_string(),
            minute: minute.to_string(),
            second: second.to_string(),
            meridiem: if is_24_hour {
                String::new()
            } else {
                meridiem.to_string()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitRows {
    pub destination: HeaderRow,
    pub present: HeaderRow,
    pub last_departed: HeaderRow,
    /// Share of the present day already elapsed, 0..100.
    pub day_marker_percent: Option<f64>,
}

/// Turns one device time reading into the three time-circuit rows.
pub struct DisplayUpdater<'a> {
    formatter: TimeFormatter<'a>,
}

impl<'a> DisplayUpdater<'a> {
    pub fn new(table: &'a TimezoneTable) -> Self {
        Self {
            formatter: TimeFormatter::new(table),
        }
    }

    pub fn refresh(
        &self,
        present_unix: i64,
        settings: &ClockSettings,
        last_departed: &LastDeparted,
    ) -> CircuitRows {
        let is_24_hour = settings.display_format24h;
        let present_index = settings.present_timezone_index;
        let destination_index = settings.destination_timezone_index;
        let present_zone = self.formatter.zone(present_index);

        let present = self.formatter.format(present_unix, present_index, is_24_hour);

        let destination_unix = self
            .formatter
            .zone(destination_index)
            .and_then(|zone| destination_timestamp(present_unix, settings.destination_year, &zone))
            .unwrap_or(present_unix);
        let destination = self
            .formatter
            .format(destination_unix, destination_index, is_24_hour);
        let destination_year = format!("{:04}", settings.destination_year);

        // Recomputed from the stored fields on every refresh.
        let last_unix = present_zone
            .as_ref()
            .and_then(|zone| last_departed_timestamp(last_departed, zone));
        let last = match last_unix {
            Some(unix) => self.formatter.format(unix, present_index, is_24_hour),
            None => FormattedMoment::placeholder(),
        };

        CircuitRows {
            destination: HeaderRow::from_moment(
                &destination,
                is_24_hour,
                Some(destination_year.as_str()),
            ),
            present: HeaderRow::from_moment(&present, is_24_hour, None),
            last_departed: HeaderRow::from_moment(&last, is_24_hour, None),
            day_marker_percent: present_zone
                .as_ref()
                .and_then(|zone| day_marker_percent(present_unix, zone)),
        }
    }
}

/// The present instant with its wall-clock year replaced, resolved in `zone`.
pub fn destination_timestamp(present_unix: i64, year: i32, zone: &Tz) -> Option<i64> {
    let present = DateTime::from_timestamp(present_unix, 0)?.with_timezone(zone);
    let wall = present.naive_local();
    let date = wall.date().with_year(year).or_else(|| {
        // Feb 29 in a non-leap year rolls over to Mar 1.
        NaiveDate::from_ymd_opt(year, 3, 1)
    })?;
    resolve_wall_clock(zone, date.and_time(wall.time())).map(|dt| dt.timestamp())
}

/// Instant of the stored last-departed wall clock, interpreted in `zone`.
pub fn last_departed_timestamp(stamp: &LastDeparted, zone: &Tz) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(stamp.year, stamp.month, stamp.day)?;
    let time = NaiveTime::from_hms_opt(stamp.hour, stamp.minute, 0)?;
    resolve_wall_clock(zone, date.and_time(time)).map(|dt| dt.timestamp())
}

fn resolve_wall_clock(zone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        // Wall clock inside a DST gap moves forward past the gap.
        LocalResult::None => zone
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest(),
    }
}

pub fn day_marker_percent(present_unix: i64, zone: &Tz) -> Option<f64> {
    let local = DateTime::from_timestamp(present_unix, 0)?.with_timezone(zone);
    let minutes = f64::from(local.hour() * 60 + local.minute());
    Some(minutes / MINUTES_PER_DAY * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleBar {
    pub left_percent: f64,
    pub width_percent: f64,
}

/// Sleep window bars across a 24h strip, from departure (sleep) to arrival (wake).
pub fn sleep_schedule_bars(departure: (u32, u32), arrival: (u32, u32)) -> Vec<ScheduleBar> {
    let departure_minutes = f64::from(departure.0 * 60 + departure.1);
    let arrival_minutes = f64::from(arrival.0 * 60 + arrival.1);
    let percent = |minutes: f64| minutes / MINUTES_PER_DAY * 100.0;

    let mut bars = Vec::new();
    if departure_minutes < arrival_minutes {
        bars.push(ScheduleBar {
            left_percent: percent(departure_minutes),
            width_percent: percent(arrival_minutes - departure_minutes),
        });
    } else if departure_minutes > arrival_minutes {
        let evening = percent(MINUTES_PER_DAY - departure_minutes);
        if evening > 0.0 {
            bars.push(ScheduleBar {
                left_percent: percent(departure_minutes),
                width_percent: evening,
            });
        }
        let morning = percent(arrival_minutes);
        if morning > 0.0 {
            bars.push(ScheduleBar {
                left_percent: 0.0,
                width_percent: morning,
            });
        }
    }
    bars
}

/// Signal bars (1-4) for a WiFi RSSI reading in dBm.
pub fn wifi_strength_level(rssi: i32) -> u8 {
    if rssi >= -67 {
        4
    } else if rssi >= -70 {
        3
    } else if rssi >= -80 {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use chrono_tz::America::New_York;
    use chrono_tz::UTC;

    use super::*;
    use crate::timezone::model::TimezoneEntry;

    fn table() -> TimezoneTable {
        let entry = |value: u32, iana: &str| TimezoneEntry {
            value,
            display_label: iana.to_string(),
            iana_name: iana.to_string(),
            country: "Test".to_string(),
        };
        TimezoneTable::from_entries(vec![
            entry(0, "UTC"),
            entry(1, "America/New_York"),
            entry(2, "Asia/Tokyo"),
        ])
        .expect("valid table")
    }

    fn settings(present: u32, destination: u32, year: i32, is_24_hour: bool) -> ClockSettings {
        ClockSettings {
            present_timezone_index: present,
            destination_timezone_index: destination,
            destination_year: year,
            display_format24h: is_24_hour,
            ..ClockSettings::default()
        }
    }

    #[test]
    fn present_row_splits_formatted_fields() {
        let table = table();
        let updater = DisplayUpdater::new(&table);
        let last = "1985-10-26-01-21".parse::<LastDeparted>().expect("stamp");
        // 2015-10-21T16:29:00Z
        let rows = updater.refresh(1_445_444_940, &settings(0, 0, 1955, false), &last);
        assert_eq!(rows.present.month, "OCT");
        assert_eq!(rows.present.day, "21");
        assert_eq!(rows.present.year, "2015");
        assert_eq!(rows.present.hour, "04");
        assert_eq!(rows.present.minute, "29");
        assert_eq!(rows.present.second, "00");
        assert_eq!(rows.present.meridiem, "PM");
    }

    #[test]
    fn destination_row_shows_destination_year_and_zone() {
        let table = table();
        let updater = DisplayUpdater::new(&table);
        let last = "1985-10-26-01-21".parse::<LastDeparted>().expect("stamp");
        let rows = updater.refresh(1_445_444_940, &settings(0, 1, 1955, true), &last);
        assert_eq!(rows.destination.year, "1955");
        assert_eq!(rows.destination.month, "OCT");
        assert_eq!(rows.destination.day, "21");
        assert_eq!(rows.destination.hour, "12");
        assert_eq!(rows.destination.minute, "29");
        assert_eq!(rows.destination.meridiem, "");
    }

    #[test]
    fn last_departed_row_matches_stored_fields() {
        let table = table();
        let updater = DisplayUpdater::new(&table);
        let last = "1985-10-26-01-21".parse::<LastDeparted>().expect("stamp");
        for present in [0_u32, 1, 2] {
            let rows = updater.refresh(1_445_444_940, &settings(present, 0, 1955, true), &last);
            assert_eq!(rows.last_departed.month, "OCT");
            assert_eq!(rows.last_departed.day, "26");
            assert_eq!(rows.last_departed.year, "1985");
            assert_eq!(rows.last_departed.hour, "01");
            assert_eq!(rows.last_departed.minute, "21");
        }
    }

    #[test]
    fn unknown_zone_renders_placeholder_rows() {
        let table = table();
        let updater = DisplayUpdater::new(&table);
        let last = "1985-10-26-01-21".parse::<LastDeparted>().expect("stamp");
        let rows = updater.refresh(0, &settings(42, 42, 1955, false), &last);
        assert_eq!(rows.present, HeaderRow::placeholder());
        assert_eq!(rows.destination, HeaderRow::placeholder());
        assert_eq!(rows.last_departed, HeaderRow::placeholder());
        assert_eq!(rows.day_marker_percent, None);
    }

    #[test]
    fn destination_keeps_wall_clock_across_year_change() {
        let present = New_York
            .with_ymd_and_hms(2024, 7, 4, 9, 15, 30)
            .single()
            .expect("valid");
        let shifted =
            destination_timestamp(present.timestamp(), 1985, &New_York).expect("destination");
        let local = DateTime::from_timestamp(shifted, 0)
            .expect("in range")
            .with_timezone(&New_York);
        assert_eq!(local.year(), 1985);
        assert_eq!((local.month(), local.day()), (7, 4));
        assert_eq!((local.hour(), local.minute(), local.second()), (9, 15, 30));
    }

    #[test]
    fn leap_day_rolls_to_march_first_in_common_year() {
        let present = UTC
            .with_ymd_and_hms(2024, 2, 29, 12, 0, 0)
            .single()
            .expect("valid");
        let shifted = destination_timestamp(present.timestamp(), 2023, &UTC).expect("destination");
        let local = DateTime::from_timestamp(shifted, 0).expect("in range");
        assert_eq!((local.year(), local.month(), local.day()), (2023, 3, 1));
    }

    #[test]
    fn last_departed_inside_dst_gap_moves_forward() {
        let stamp = "2026-03-08-02-30".parse::<LastDeparted>().expect("stamp");
        let unix = last_departed_timestamp(&stamp, &New_York).expect("resolved");
        let local = DateTime::from_timestamp(unix, 0)
            .expect("in range")
            .with_timezone(&New_York);
        assert_eq!((local.hour(), local.minute()), (3, 30));
    }

    #[test]
    fn impossible_calendar_date_has_no_timestamp() {
        let stamp = LastDeparted {
            year: 2023,
            month: 2,
            day: 31,
            hour: 0,
            minute: 0,
        };
        assert_eq!(last_departed_timestamp(&stamp, &UTC), None);
    }

    #[test]
    fn day_marker_tracks_minutes_since_midnight() {
        let noon = UTC.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().expect("valid");
        assert_eq!(day_marker_percent(noon.timestamp(), &UTC), Some(50.0));
    }

    #[test]
    fn sleep_bars_wrap_past_midnight() {
        let bars = sleep_schedule_bars((22, 0), (6, 0));
        assert_eq!(bars.len(), 2);
        assert!((bars[0].left_percent - 91.666).abs() < 0.01);
        assert!((bars[0].width_percent - 8.333).abs() < 0.01);
        assert_eq!(bars[1].left_percent, 0.0);
        assert!((bars[1].width_percent - 25.0).abs() < 0.01);
    }

    #[test]
    fn sleep_bars_same_day_and_empty_window() {
        let bars = sleep_schedule_bars((1, 0), (7, 0));
        assert_eq!(bars.len(), 1);
        assert!((bars[0].width_percent - 25.0).abs() < 0.01);
        assert!(sleep_schedule_bars((7, 0), (7, 0)).is_empty());
        assert_eq!(sleep_schedule_bars((0, 0), (0, 0)), Vec::new());
    }

    #[test]
    fn wifi_levels_follow_rssi_thresholds() {
        assert_eq!(wifi_strength_level(-50), 4);
        assert_eq!(wifi_strength_level(-67), 4);
        assert_eq!(wifi_strength_level(-69), 3);
        assert_eq!(wifi_strength_level(-75), 2);
        assert_eq!(wifi_strength_level(-90), 1);
    }

    #[test]
    fn twelve_hour_row_keeps_meridiem_and_24h_row_drops_it() {
        let moment = FormattedMoment {
            time: "07:05:09 AM".to_string(),
            date: "03/04/2021".to_string(),
        };
        let row = HeaderRow::from_moment(&moment, false, None);
        assert_eq!(row.meridiem, "AM");
        assert_eq!(row.month, "MAR");
        let row = HeaderRow::from_moment(&moment, true, Some("1885"));
        assert_eq!(row.meridiem, "");
        assert_eq!(row.year, "1885");
    }
}
