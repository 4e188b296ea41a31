use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;

use crate::device::error::DeviceError;
use crate::device::types::{GreatScottState, StatusReading, TimeReading};
use crate::presets::Preset;
use crate::settings::{ClockSettings, LastDeparted, SettingField};
use crate::timezone::model::{TimezoneOptionFile, TimezoneTable, timezone_table_from_wire};

pub const DEFAULT_DEVICE_URL: &str = "http://timecircuits.local";

/// One call per device endpoint. Write calls return the device's plain-text reply.
pub trait DeviceApi {
    fn timezones(&self) -> Result<TimezoneTable, DeviceError>;
    fn presets(&self) -> Result<Vec<Preset>, DeviceError>;
    fn settings(&self) -> Result<ClockSettings, DeviceError>;
    fn status(&self) -> Result<StatusReading, DeviceError>;
    fn time(&self) -> Result<TimeReading, DeviceError>;
    fn preview_setting(&self, field: SettingField, value: &str) -> Result<String, DeviceError>;
    fn time_travel(&self) -> Result<String, DeviceError>;
    fn test_sound(&self) -> Result<String, DeviceError>;
    fn toggle_great_scott(&self) -> Result<GreatScottState, DeviceError>;
    fn set_last_departed(&self, stamp: &LastDeparted) -> Result<String, DeviceError>;
    fn add_preset(&self, preset: &Preset) -> Result<String, DeviceError>;
    fn update_preset(&self, original_value: &str, preset: &Preset)
    -> Result<String, DeviceError>;
    fn delete_preset(&self, value: &str) -> Result<String, DeviceError>;
    fn clear_presets(&self) -> Result<String, DeviceError>;
    fn sync_ntp(&self) -> Result<String, DeviceError>;
    fn save_settings(&self, settings: &ClockSettings) -> Result<String, DeviceError>;
    fn reset_settings(&self) -> Result<String, DeviceError>;
    fn reset_wifi(&self) -> Result<String, DeviceError>;
    fn clear_preferences(&self) -> Result<String, DeviceError>;
}

pub struct HttpDevice {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpDevice {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url: normalize_base_url(base_url),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_text(&self, path: &str, query: &[(&str, &str)]) -> Result<String, DeviceError> {
        let mut request = self.agent.get(&self.url(path));
        for (key, value) in query {
            request = request.query(key, value);
        }
        self.execute(path, request, None)
    }

    fn post_text(
        &self,
        path: &str,
        query: &[(&str, &str)],
        form: Option<&[(&str, &str)]>,
    ) -> Result<String, DeviceError> {
        let mut request = self.agent.post(&self.url(path));
        for (key, value) in query {
            request = request.query(key, value);
        }
        self.execute(path, request, form)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeviceError> {
        let body = self.get_text(path, &[])?;
        decode_json(path, &body)
    }

    fn execute(
        &self,
        path: &str,
        request: ureq::Request,
        form: Option<&[(&str, &str)]>,
    ) -> Result<String, DeviceError> {
        debug!("{} {}", request.method(), request.url());
        let result = match form {
            Some(form) => request.send_form(form),
            None => request.call(),
        };
        match result {
            Ok(response) => response.into_string().map_err(|source| DeviceError::Io {
                path: path.to_string(),
                source,
            }),
            Err(ureq::Error::Status(status, response)) => Err(DeviceError::Rejected {
                path: path.to_string(),
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => Err(DeviceError::Unreachable {
                url: self.base_url.clone(),
                message: transport.to_string(),
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl DeviceApi for HttpDevice {
    fn timezones(&self) -> Result<TimezoneTable, DeviceError> {
        let path = "/api/timezones";
        let raw: BTreeMap<String, Vec<TimezoneOptionFile>> = self.get_json(path)?;
        timezone_table_from_wire(raw).map_err(|err| DeviceError::Invalid {
            path: path.to_string(),
            message: format!("{err:#}"),
        })
    }

    fn presets(&self) -> Result<Vec<Preset>, DeviceError> {
        self.get_json("/api/getPresets")
    }

    fn settings(&self) -> Result<ClockSettings, DeviceError> {
        self.get_json("/api/settings")
    }

    fn status(&self) -> Result<StatusReading, DeviceError> {
        self.get_json("/api/status")
    }

    fn time(&self) -> Result<TimeReading, DeviceError> {
        self.get_json("/api/time")
    }

    fn preview_setting(&self, field: SettingField, value: &str) -> Result<String, DeviceError> {
        self.get_text(
            "/api/previewSetting",
            &[("setting", field.as_str()), ("value", value)],
        )
    }

    fn time_travel(&self) -> Result<String, DeviceError> {
        self.get_text("/api/timeTravel", &[])
    }

    fn test_sound(&self) -> Result<String, DeviceError> {
        self.get_text("/api/testSound", &[])
    }

    fn toggle_great_scott(&self) -> Result<GreatScottState, DeviceError> {
        let path = "/api/toggleGreatScottSound";
        let body = self.post_text(path, &[], None)?;
        decode_json(path, &body)
    }

    fn set_last_departed(&self, stamp: &LastDeparted) -> Result<String, DeviceError> {
        let value = stamp.to_string();
        self.post_text("/api/setLastDeparted", &[("value", value.as_str())], None)
    }

    fn add_preset(&self, preset: &Preset) -> Result<String, DeviceError> {
        self.post_text(
            "/api/addPreset",
            &[],
            Some(&[("name", preset.name.as_str()), ("value", preset.value.as_str())]),
        )
    }

    fn update_preset(
        &self,
        original_value: &str,
        preset: &Preset,
    ) -> Result<String, DeviceError> {
        self.post_text(
            "/api/updatePreset",
            &[],
            Some(&[
                ("originalValue", original_value),
                ("newName", preset.name.as_str()),
                ("newValue", preset.value.as_str()),
            ]),
        )
    }

    fn delete_preset(&self, value: &str) -> Result<String, DeviceError> {
        self.post_text("/api/deletePreset", &[], Some(&[("value", value)]))
    }

    fn clear_presets(&self) -> Result<String, DeviceError> {
        self.post_text("/api/clearPresets", &[], None)
    }

    fn sync_ntp(&self) -> Result<String, DeviceError> {
        self.post_text("/api/syncNtp", &[], None)
    }

    fn save_settings(&self, settings: &ClockSettings) -> Result<String, DeviceError> {
        let form = settings.to_form();
        let pairs = form
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect::<Vec<_>>();
        self.post_text("/api/saveSettings", &[], Some(pairs.as_slice()))
    }

    fn reset_settings(&self) -> Result<String, DeviceError> {
        self.post_text("/api/resetSettings", &[], None)
    }

    fn reset_wifi(&self) -> Result<String, DeviceError> {
        self.post_text("/api/resetWifi", &[], None)
    }

    fn clear_preferences(&self) -> Result<String, DeviceError> {
        self.post_text("/api/clearPreferences", &[], None)
    }
}

fn decode_json<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, DeviceError> {
    serde_json::from_str(body).map_err(|source| DeviceError::Malformed {
        path: path.to_string(),
        source,
    })
}

pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
