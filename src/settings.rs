use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::display::MONTH_ABBREVIATIONS;

/// Snapshot of the device settings, field names as the device reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClockSettings {
    pub destination_year: i32,
    pub destination_timezone_index: u32,
    pub present_timezone_index: u32,
    pub last_time_departed_year: i32,
    pub last_time_departed_month: u32,
    pub last_time_departed_day: u32,
    pub last_time_departed_hour: u32,
    pub last_time_departed_minute: u32,
    pub departure_hour: u32,
    pub departure_minute: u32,
    pub arrival_hour: u32,
    pub arrival_minute: u32,
    pub brightness: u32,
    pub notification_volume: u32,
    pub time_travel_animation_interval: u32,
    pub preset_cycle_interval: u32,
    pub time_travel_animation_duration: u64,
    pub time_travel_sound_toggle: bool,
    pub display_format24h: bool,
    pub great_scott_sound_toggle: bool,
    pub theme: u32,
    pub animation_style: u32,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            destination_year: 1955,
            destination_timezone_index: 0,
            present_timezone_index: 0,
            last_time_departed_year: 1985,
            last_time_departed_month: 10,
            last_time_departed_day: 26,
            last_time_departed_hour: 1,
            last_time_departed_minute: 21,
            departure_hour: 22,
            departure_minute: 0,
            arrival_hour: 7,
            arrival_minute: 0,
            brightness: 5,
            notification_volume: 20,
            time_travel_animation_interval: 15,
            preset_cycle_interval: 0,
            time_travel_animation_duration: 4_000,
            time_travel_sound_toggle: true,
            display_format24h: false,
            great_scott_sound_toggle: false,
            theme: 0,
            animation_style: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SettingField {
    DestinationYear,
    DestinationTimezoneIndex,
    LastTimeDepartedHour,
    LastTimeDepartedMinute,
    LastTimeDepartedMonth,
    LastTimeDepartedDay,
    LastTimeDepartedYear,
    DepartureHour,
    DepartureMinute,
    ArrivalHour,
    ArrivalMinute,
    Brightness,
    NotificationVolume,
    TimeTravelAnimationInterval,
    PresetCycleInterval,
    TimeTravelAnimationDuration,
    TimeTravelSoundToggle,
    DisplayFormat24h,
    GreatScottSoundToggle,
    Theme,
    PresentTimezoneIndex,
    AnimationStyle,
}

impl SettingField {
    /// Every field, in the order the save form submits them.
    pub const ALL: [SettingField; 22] = [
        SettingField::DestinationYear,
        SettingField::DestinationTimezoneIndex,
        SettingField::LastTimeDepartedHour,
        SettingField::LastTimeDepartedMinute,
        SettingField::LastTimeDepartedMonth,
        SettingField::LastTimeDepartedDay,
        SettingField::LastTimeDepartedYear,
        SettingField::DepartureHour,
        SettingField::DepartureMinute,
        SettingField::ArrivalHour,
        SettingField::ArrivalMinute,
        SettingField::Brightness,
        SettingField::NotificationVolume,
        SettingField::TimeTravelAnimationInterval,
        SettingField::PresetCycleInterval,
        SettingField::TimeTravelAnimationDuration,
        SettingField::TimeTravelSoundToggle,
        SettingField::DisplayFormat24h,
        SettingField::GreatScottSoundToggle,
        SettingField::Theme,
        SettingField::PresentTimezoneIndex,
        SettingField::AnimationStyle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingField::DestinationYear => "destinationYear",
            SettingField::DestinationTimezoneIndex => "destinationTimezoneIndex",
            SettingField::LastTimeDepartedHour => "lastTimeDepartedHour",
            SettingField::LastTimeDepartedMinute => "lastTimeDepartedMinute",
            SettingField::LastTimeDepartedMonth => "lastTimeDepartedMonth",
            SettingField::LastTimeDepartedDay => "lastTimeDepartedDay",
            SettingField::LastTimeDepartedYear => "lastTimeDepartedYear",
            SettingField::DepartureHour => "departureHour",
            SettingField::DepartureMinute => "departureMinute",
            SettingField::ArrivalHour => "arrivalHour",
            SettingField::ArrivalMinute => "arrivalMinute",
            SettingField::Brightness => "brightness",
            SettingField::NotificationVolume => "notificationVolume",
            SettingField::TimeTravelAnimationInterval => "timeTravelAnimationInterval",
            SettingField::PresetCycleInterval => "presetCycleInterval",
            SettingField::TimeTravelAnimationDuration => "timeTravelAnimationDuration",
            SettingField::TimeTravelSoundToggle => "timeTravelSoundToggle",
            SettingField::DisplayFormat24h => "displayFormat24h",
            SettingField::GreatScottSoundToggle => "greatScottSoundToggle",
            SettingField::Theme => "theme",
            SettingField::PresentTimezoneIndex => "presentTimezoneIndex",
            SettingField::AnimationStyle => "animationStyle",
        }
    }

    /// Fields the device can apply immediately through a live preview.
    pub fn is_previewable(self) -> bool {
        matches!(
            self,
            SettingField::Brightness
                | SettingField::NotificationVolume
                | SettingField::TimeTravelAnimationDuration
                | SettingField::DisplayFormat24h
                | SettingField::AnimationStyle
                | SettingField::DestinationYear
                | SettingField::DestinationTimezoneIndex
                | SettingField::PresentTimezoneIndex
        )
    }

    /// Fields whose preview changes what the time rows show.
    pub fn affects_time_rows(self) -> bool {
        matches!(
            self,
            SettingField::DisplayFormat24h
                | SettingField::DestinationYear
                | SettingField::DestinationTimezoneIndex
                | SettingField::PresentTimezoneIndex
        )
    }

    /// Inclusive bounds for numeric inputs.
    pub fn range(self) -> Option<(i64, i64)> {
        match self {
            SettingField::DestinationYear | SettingField::LastTimeDepartedYear => Some((1, 9999)),
            SettingField::LastTimeDepartedMonth => Some((1, 12)),
            SettingField::LastTimeDepartedDay => Some((1, 31)),
            SettingField::LastTimeDepartedHour
            | SettingField::DepartureHour
            | SettingField::ArrivalHour => Some((0, 23)),
            SettingField::LastTimeDepartedMinute
            | SettingField::DepartureMinute
            | SettingField::ArrivalMinute => Some((0, 59)),
            SettingField::Brightness => Some((0, 7)),
            SettingField::NotificationVolume => Some((0, 30)),
            SettingField::TimeTravelAnimationInterval => Some((0, 60)),
            SettingField::PresetCycleInterval => Some((0, 60)),
            SettingField::TimeTravelAnimationDuration => Some((500, 10_000)),
            SettingField::Theme => Some((0, 5)),
            SettingField::AnimationStyle => Some((0, 3)),
            SettingField::DestinationTimezoneIndex
            | SettingField::PresentTimezoneIndex
            | SettingField::TimeTravelSoundToggle
            | SettingField::DisplayFormat24h
            | SettingField::GreatScottSoundToggle => None,
        }
    }
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        SettingField::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| anyhow!("unknown setting '{trimmed}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: SettingField,
    pub message: String,
}

impl ClockSettings {
    pub fn get(&self, field: SettingField) -> String {
        match field {
            SettingField::DestinationYear => self.destination_year.to_string(),
            SettingField::DestinationTimezoneIndex => self.destination_timezone_index.to_string(),
            SettingField::PresentTimezoneIndex => self.present_timezone_index.to_string(),
            SettingField::LastTimeDepartedYear => self.last_time_departed_year.to_string(),
            SettingField::LastTimeDepartedMonth => {
                format!("{:02}", self.last_time_departed_month)
            }
            SettingField::LastTimeDepartedDay => format!("{:02}", self.last_time_departed_day),
            SettingField::LastTimeDepartedHour => format!("{:02}", self.last_time_departed_hour),
            SettingField::LastTimeDepartedMinute => {
                format!("{:02}", self.last_time_departed_minute)
            }
            SettingField::DepartureHour => format!("{:02}", self.departure_hour),
            SettingField::DepartureMinute => format!("{:02}", self.departure_minute),
            SettingField::ArrivalHour => format!("{:02}", self.arrival_hour),
            SettingField::ArrivalMinute => format!("{:02}", self.arrival_minute),
            SettingField::Brightness => self.brightness.to_string(),
            SettingField::NotificationVolume => self.notification_volume.to_string(),
            SettingField::TimeTravelAnimationInterval => {
                self.time_travel_animation_interval.to_string()
            }
            SettingField::PresetCycleInterval => self.preset_cycle_interval.to_string(),
            SettingField::TimeTravelAnimationDuration => {
                self.time_travel_animation_duration.to_string()
            }
            SettingField::TimeTravelSoundToggle => self.time_travel_sound_toggle.to_string(),
            SettingField::DisplayFormat24h => self.display_format24h.to_string(),
            SettingField::GreatScottSoundToggle => self.great_scott_sound_toggle.to_string(),
            SettingField::Theme => self.theme.to_string(),
            SettingField::AnimationStyle => self.animation_style.to_string(),
        }
    }

    /// Parses `raw` into the field. Only the type is checked here; bounds are
    /// reported by [`ClockSettings::validate`].
    pub fn set(&mut self, field: SettingField, raw: &str) -> Result<()> {
        let raw = raw.trim();
        match field {
            SettingField::DestinationYear => self.destination_year = parse_number(field, raw)?,
            SettingField::DestinationTimezoneIndex => {
                self.destination_timezone_index = parse_number(field, raw)?
            }
            SettingField::PresentTimezoneIndex => {
                self.present_timezone_index = parse_number(field, raw)?
            }
            SettingField::LastTimeDepartedYear => {
                self.last_time_departed_year = parse_number(field, raw)?
            }
            SettingField::LastTimeDepartedMonth => {
                self.last_time_departed_month = parse_number(field, raw)?
            }
            SettingField::LastTimeDepartedDay => {
                self.last_time_departed_day = parse_number(field, raw)?
            }
            SettingField::LastTimeDepartedHour => {
                self.last_time_departed_hour = parse_number(field, raw)?
            }
            SettingField::LastTimeDepartedMinute => {
                self.last_time_departed_minute = parse_number(field, raw)?
            }
            SettingField::DepartureHour => self.departure_hour = parse_number(field, raw)?,
            SettingField::DepartureMinute => self.departure_minute = parse_number(field, raw)?,
            SettingField::ArrivalHour => self.arrival_hour = parse_number(field, raw)?,
            SettingField::ArrivalMinute => self.arrival_minute = parse_number(field, raw)?,
            SettingField::Brightness => self.brightness = parse_number(field, raw)?,
            SettingField::NotificationVolume => {
                self.notification_volume = parse_number(field, raw)?
            }
            SettingField::TimeTravelAnimationInterval => {
                self.time_travel_animation_interval = parse_number(field, raw)?
            }
            SettingField::PresetCycleInterval => {
                self.preset_cycle_interval = parse_number(field, raw)?
            }
            SettingField::TimeTravelAnimationDuration => {
                self.time_travel_animation_duration = parse_number(field, raw)?
            }
            SettingField::TimeTravelSoundToggle => {
                self.time_travel_sound_toggle = parse_flag(field, raw)?
            }
            SettingField::DisplayFormat24h => self.display_format24h = parse_flag(field, raw)?,
            SettingField::GreatScottSoundToggle => {
                self.great_scott_sound_toggle = parse_flag(field, raw)?
            }
            SettingField::Theme => self.theme = parse_number(field, raw)?,
            SettingField::AnimationStyle => self.animation_style = parse_number(field, raw)?,
        }
        Ok(())
    }

    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        for field in SettingField::ALL {
            let Some((min, max)) = field.range() else {
                continue;
            };
            let in_range = self
                .get(field)
                .parse::<i64>()
                .map(|value| (min..=max).contains(&value))
                .unwrap_or(false);
            if !in_range {
                issues.push(FieldIssue {
                    field,
                    message: format!("Value must be between {min} and {max}."),
                });
            }
        }
        issues
    }

    /// Form pairs for the save endpoint.
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        SettingField::ALL
            .into_iter()
            .map(|field| (field.as_str(), self.get(field)))
            .collect()
    }

    /// Applies every recognised pair; unknown keys are ignored.
    pub fn apply_form<'a, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in pairs {
            if let Ok(field) = key.parse::<SettingField>() {
                self.set(field, value)?;
            }
        }
        Ok(())
    }

    pub fn last_departed(&self) -> LastDeparted {
        LastDeparted {
            year: self.last_time_departed_year,
            month: self.last_time_departed_month,
            day: self.last_time_departed_day,
            hour: self.last_time_departed_hour,
            minute: self.last_time_departed_minute,
        }
    }

    pub fn set_last_departed(&mut self, stamp: &LastDeparted) {
        self.last_time_departed_year = stamp.year;
        self.last_time_departed_month = stamp.month;
        self.last_time_departed_day = stamp.day;
        self.last_time_departed_hour = stamp.hour;
        self.last_time_departed_minute = stamp.minute;
    }
}

fn parse_number<T: FromStr>(field: SettingField, raw: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("invalid value '{raw}' for {field}"))
}

fn parse_flag(field: SettingField, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => bail!("invalid value '{raw}' for {field}, expected true or false"),
    }
}

/// Wall-clock stamp of the last departure, stored as separate fields and
/// exchanged as `YYYY-MM-DD-HH-MM` (the preset value format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastDeparted {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl LastDeparted {
    /// Builds a stamp from an HTML-style date (`YYYY-MM-DD`) and time (`HH:MM`).
    pub fn from_date_and_time(date: &str, time: &str) -> Result<Self> {
        let (year, rest) = date
            .trim()
            .split_once('-')
            .ok_or_else(|| anyhow!("invalid date '{date}', expected YYYY-MM-DD"))?;
        let (month, day) = rest
            .split_once('-')
            .ok_or_else(|| anyhow!("invalid date '{date}', expected YYYY-MM-DD"))?;
        let (hour, minute) = time
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid time '{time}', expected HH:MM"))?;
        format!("{year}-{month}-{day}-{hour}-{minute}").parse()
    }

    /// `MON DD YYYY HH:MM`, as shown next to the preset selector.
    pub fn summary(&self) -> String {
        let month = usize::try_from(self.month)
            .ok()
            .and_then(|month| month.checked_sub(1))
            .and_then(|index| MONTH_ABBREVIATIONS.get(index))
            .copied()
            .unwrap_or("---");
        format!(
            "{month} {:02} {} {:02}:{:02}",
            self.day, self.year, self.hour, self.minute
        )
    }
}

impl fmt::Display for LastDeparted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}-{:02}-{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

impl FromStr for LastDeparted {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s.trim().split('-').collect::<Vec<_>>();
        let &[year, month, day, hour, minute] = parts.as_slice() else {
            bail!("invalid preset value '{s}', expected YYYY-MM-DD-HH-MM");
        };
        let number = |label: &str, text: &str, min: u32, max: u32| -> Result<u32> {
            let value = text
                .parse::<u32>()
                .with_context(|| format!("invalid {label} '{text}' in preset value '{s}'"))?;
            if !(min..=max).contains(&value) {
                bail!("{label} {value} out of range {min}-{max} in preset value '{s}'");
            }
            Ok(value)
        };
        let year = number("year", year, 1, 9999)?;
        Ok(Self {
            year: i32::try_from(year).context("year out of range")?,
            month: number("month", month, 1, 12)?,
            day: number("day", day, 1, 31)?,
            hour: number("hour", hour, 0, 23)?,
            minute: number("minute", minute, 0, 59)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_settings_snapshot() {
        let json = r#"
{
  "destinationYear": 2015,
  "destinationTimezoneIndex": 3,
  "presentTimezoneIndex": 1,
  "lastTimeDepartedYear": 1955,
  "lastTimeDepartedMonth": 11,
  "lastTimeDepartedDay": 12,
  "lastTimeDepartedHour": 22,
  "lastTimeDepartedMinute": 4,
  "departureHour": 23,
  "departureMinute": 30,
  "arrivalHour": 6,
  "arrivalMinute": 45,
  "brightness": 7,
  "notificationVolume": 15,
  "timeTravelAnimationInterval": 10,
  "presetCycleInterval": 2,
  "timeTravelAnimationDuration": 3000,
  "timeTravelSoundToggle": false,
  "displayFormat24h": true,
  "greatScottSoundToggle": true,
  "theme": 2,
  "animationStyle": 1
}
"#;
        let settings = serde_json::from_str::<ClockSettings>(json).expect("valid settings");
        assert_eq!(settings.destination_year, 2015);
        assert!(settings.display_format24h);
        assert_eq!(settings.preset_cycle_interval, 2);
        assert_eq!(settings.last_departed().to_string(), "1955-11-12-22-04");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings =
            serde_json::from_str::<ClockSettings>(r#"{ "destinationYear": 2015 }"#)
                .expect("partial settings");
        assert_eq!(settings.destination_year, 2015);
        assert_eq!(settings.brightness, ClockSettings::default().brightness);
    }

    #[test]
    fn form_pads_last_departed_fields_and_lists_every_field() {
        let settings = ClockSettings::default();
        let form = settings.to_form();
        assert_eq!(form.len(), SettingField::ALL.len());
        assert_eq!(form[0], ("destinationYear", "1955".to_string()));
        assert!(form.contains(&("lastTimeDepartedHour", "01".to_string())));
        assert!(form.contains(&("displayFormat24h", "false".to_string())));
    }

    #[test]
    fn apply_form_round_trips_settings() {
        let mut original = ClockSettings::default();
        original.destination_year = 2015;
        original.display_format24h = true;
        original.last_time_departed_minute = 7;
        let form = original.to_form();

        let mut restored = ClockSettings::default();
        restored
            .apply_form(form.iter().map(|(k, v)| (*k, v.as_str())))
            .expect("apply form");
        assert_eq!(restored, original);
    }

    #[test]
    fn set_rejects_wrong_types() {
        let mut settings = ClockSettings::default();
        let err = settings
            .set(SettingField::Brightness, "bright")
            .expect_err("not a number");
        assert!(err.to_string().contains("brightness"));
        assert!(settings.set(SettingField::DisplayFormat24h, "maybe").is_err());
        settings
            .set(SettingField::DisplayFormat24h, "on")
            .expect("flag accepted");
        assert!(settings.display_format24h);
    }

    #[test]
    fn validate_reports_out_of_range_fields() {
        let mut settings = ClockSettings::default();
        assert!(settings.validate().is_empty());
        settings.brightness = 12;
        settings.last_time_departed_month = 13;
        let issues = settings.validate();
        let fields = issues.iter().map(|issue| issue.field).collect::<Vec<_>>();
        assert_eq!(
            fields,
            vec![SettingField::LastTimeDepartedMonth, SettingField::Brightness]
        );
        assert_eq!(issues[1].message, "Value must be between 0 and 7.");
    }

    #[test]
    fn setting_names_parse_case_insensitively() {
        assert_eq!(
            "displayformat24h".parse::<SettingField>().expect("parse"),
            SettingField::DisplayFormat24h
        );
        assert!("warpFactor".parse::<SettingField>().is_err());
    }

    #[test]
    fn preview_only_covers_live_fields() {
        assert!(SettingField::Brightness.is_previewable());
        assert!(SettingField::PresentTimezoneIndex.affects_time_rows());
        assert!(!SettingField::Brightness.affects_time_rows());
        assert!(!SettingField::Theme.is_previewable());
    }

    #[test]
    fn last_departed_parses_and_formats_preset_values() {
        let stamp = "1985-10-26-01-21".parse::<LastDeparted>().expect("valid");
        assert_eq!(stamp.year, 1985);
        assert_eq!(stamp.minute, 21);
        assert_eq!(stamp.to_string(), "1985-10-26-01-21");
        assert_eq!(stamp.summary(), "OCT 26 1985 01:21");
    }

    #[test]
    fn last_departed_rejects_malformed_values() {
        assert!("1985-10-26-01".parse::<LastDeparted>().is_err());
        assert!("1985-13-26-01-21".parse::<LastDeparted>().is_err());
        assert!("1985-10-26-24-00".parse::<LastDeparted>().is_err());
        assert!("year-10-26-01-21".parse::<LastDeparted>().is_err());
    }

    #[test]
    fn last_departed_builds_from_date_and_time_inputs() {
        let stamp = LastDeparted::from_date_and_time("2015-10-21", "16:29").expect("valid");
        assert_eq!(stamp.to_string(), "2015-10-21-16-29");
        assert!(LastDeparted::from_date_and_time("2015/10/21", "16:29").is_err());
    }

    #[test]
    fn early_years_are_zero_padded_in_values() {
        let stamp = "885-09-01-08-00".parse::<LastDeparted>().expect("valid");
        assert_eq!(stamp.to_string(), "0885-09-01-08-00");
    }
}
