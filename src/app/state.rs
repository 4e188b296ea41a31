use std::time::{Duration, Instant};

use anyhow::Result;

use crate::device::types::{StatusReading, TimeReading};
use crate::display::{CircuitRows, DisplayUpdater};
use crate::presets::{Preset, PresetList};
use crate::settings::{ClockSettings, FieldIssue, LastDeparted, SettingField};
use crate::timezone::model::TimezoneTable;

pub const DEFAULT_BANNER_TTL: Duration = Duration::from_secs(3);
pub const CLEAR_PREFERENCES_BANNER_TTL: Duration = Duration::from_secs(5);
pub const WIFI_RESET_BANNER_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BannerKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Banner {
    pub text: String,
    pub kind: BannerKind,
    pub expires_at: Instant,
}

/// Session state of the control surface. Fields change only through the
/// update methods below, which keep rows, validation results and the
/// settings-changed flag in step.
#[derive(Debug, Default)]
pub struct AppState {
    timezones: TimezoneTable,
    settings: ClockSettings,
    presets: PresetList,
    live_preview: bool,
    status: Option<StatusReading>,
    time: Option<TimeReading>,
    rows: Option<CircuitRows>,
    settings_changed: bool,
    invalid_fields: Vec<FieldIssue>,
    banner: Option<Banner>,
}

impl AppState {
    pub fn timezones(&self) -> &TimezoneTable {
        &self.timezones
    }

    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    pub fn presets(&self) -> &PresetList {
        &self.presets
    }

    pub fn live_preview(&self) -> bool {
        self.live_preview
    }

    pub fn status(&self) -> Option<&StatusReading> {
        self.status.as_ref()
    }

    pub fn time(&self) -> Option<&TimeReading> {
        self.time.as_ref()
    }

    pub fn rows(&self) -> Option<&CircuitRows> {
        self.rows.as_ref()
    }

    pub fn set_timezones(&mut self, table: TimezoneTable) {
        self.timezones = table;
        self.refresh_rows();
    }

    pub fn set_live_preview(&mut self, enabled: bool) {
        self.live_preview = enabled;
    }

    pub fn replace_presets(&mut self, presets: Vec<Preset>) {
        self.presets.replace(presets);
    }

    /// Advances the preset selection and returns the new preset's value.
    pub fn cycle_preset(&mut self) -> Option<String> {
        self.presets.cycle_next().map(|preset| preset.value.clone())
    }

    /// Records the toggle state the device reported.
    pub fn apply_great_scott(&mut self, enabled: bool) {
        self.settings.great_scott_sound_toggle = enabled;
        self.settings_changed = true;
    }

    pub fn record_status(&mut self, status: StatusReading) {
        self.status = Some(status);
    }

    /// Adopts a settings snapshot from the device as the clean baseline.
    pub fn apply_settings(&mut self, settings: ClockSettings) {
        self.settings = settings;
        let saved = self.settings.last_departed().to_string();
        self.presets.select_value(&saved);
        self.invalid_fields = self.settings.validate();
        self.settings_changed = false;
        self.refresh_rows();
    }

    pub fn update_setting(&mut self, field: SettingField, raw: &str) -> Result<()> {
        self.settings.set(field, raw)?;
        self.invalid_fields = self.settings.validate();
        self.settings_changed = true;
        if field.affects_time_rows() {
            self.refresh_rows();
        }
        Ok(())
    }

    /// Copies the preset stamp into the last-departed fields.
    pub fn select_preset(&mut self, value: &str) -> Result<LastDeparted> {
        let stamp = value.parse::<LastDeparted>()?;
        self.presets.select_value(value);
        self.settings.set_last_departed(&stamp);
        self.invalid_fields = self.settings.validate();
        self.settings_changed = true;
        self.refresh_rows();
        Ok(stamp)
    }

    pub fn mark_saved(&mut self) {
        self.settings_changed = false;
    }

    pub fn settings_changed(&self) -> bool {
        self.settings_changed
    }

    pub fn invalid_fields(&self) -> &[FieldIssue] {
        &self.invalid_fields
    }

    pub fn is_field_invalid(&self, field: SettingField) -> bool {
        self.invalid_fields.iter().any(|issue| issue.field == field)
    }

    pub fn any_input_invalid(&self) -> bool {
        !self.invalid_fields.is_empty()
    }

    pub fn save_enabled(&self) -> bool {
        self.settings_changed && !self.any_input_invalid()
    }

    pub fn record_time(&mut self, reading: TimeReading) {
        self.time = Some(reading);
        self.refresh_rows();
    }

    /// Rebuilds the circuit rows from the latest reading. Rows stay as they
    /// were until both a usable time and a timezone table are present.
    pub fn refresh_rows(&mut self) {
        let Some(present_unix) = self.time.as_ref().and_then(TimeReading::present_unix) else {
            return;
        };
        if self.timezones.is_empty() {
            return;
        }
        let updater = DisplayUpdater::new(&self.timezones);
        let last_departed = self.settings.last_departed();
        self.rows = Some(updater.refresh(present_unix, &self.settings, &last_departed));
    }

    pub fn show_banner(&mut self, text: impl Into<String>, kind: BannerKind, ttl: Duration) {
        self.show_banner_at(text, kind, ttl, Instant::now());
    }

    pub fn show_banner_at(
        &mut self,
        text: impl Into<String>,
        kind: BannerKind,
        ttl: Duration,
        now: Instant,
    ) {
        self.banner = Some(Banner {
            text: text.into(),
            kind,
            expires_at: now + ttl,
        });
    }

    pub fn active_banner(&self, now: Instant) -> Option<&Banner> {
        self.banner.as_ref().filter(|banner| now < banner.expires_at)
    }
}
