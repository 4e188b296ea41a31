use std::io::Read;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::device::types::{GreatScottState, StatusReading, TimeReading};
use crate::presets::Preset;
use crate::settings::{ClockSettings, LastDeparted, SettingField};
use crate::timezone::model::{TimezoneEntry, TimezoneTable};

pub const EMULATOR_SSID: &str = "OUTATIME";
pub const EMULATOR_RSSI: i32 = -64;
pub const EMULATOR_NTP_SERVER: &str = "pool.ntp.org";

const BUILTIN_TIMEZONES: &[(&str, &str, &str)] = &[
    ("USA", "Eastern (New York)", "America/New_York"),
    ("USA", "Central (Chicago)", "America/Chicago"),
    ("USA", "Mountain (Denver)", "America/Denver"),
    ("USA", "Arizona (Phoenix)", "America/Phoenix"),
    ("USA", "Pacific (Los Angeles)", "America/Los_Angeles"),
    ("USA", "Alaska (Anchorage)", "America/Anchorage"),
    ("USA", "Hawaii (Honolulu)", "Pacific/Honolulu"),
    ("UTC", "Coordinated Universal Time", "UTC"),
    ("Europe", "London", "Europe/London"),
    ("Europe", "Paris", "Europe/Paris"),
    ("Europe", "Berlin", "Europe/Berlin"),
    ("Asia", "Tokyo", "Asia/Tokyo"),
    ("Asia", "Kolkata", "Asia/Kolkata"),
    ("Australia", "Sydney", "Australia/Sydney"),
];

/// The timezone options the emulator serves, indexed in declaration order.
pub fn builtin_timezone_table() -> Result<TimezoneTable> {
    let entries = BUILTIN_TIMEZONES
        .iter()
        .enumerate()
        .map(|(index, (country, label, iana))| TimezoneEntry {
            value: u32::try_from(index).unwrap_or(u32::MAX),
            display_label: (*label).to_string(),
            iana_name: (*iana).to_string(),
            country: (*country).to_string(),
        })
        .collect();
    TimezoneTable::from_entries(entries)
}

/// Everything the emulated device remembers, exposed for inspection.
#[derive(Debug, Clone, Default)]
pub struct EmulatorState {
    pub settings: ClockSettings,
    pub presets: Vec<Preset>,
    pub last_preview: Option<(String, String)>,
    pub last_departed: Option<String>,
    pub time_synchronized: bool,
    pub last_sync_time: Option<String>,
    pub ntp_sync_count: u32,
    pub time_travel_count: u32,
    pub test_sound_count: u32,
    pub wifi_reset_count: u32,
    fixed_unix_time: Option<i64>,
    timezones: TimezoneTable,
}

impl EmulatorState {
    fn unix_time(&self) -> i64 {
        self.fixed_unix_time
            .unwrap_or_else(|| Utc::now().timestamp())
    }
}

/// In-process HTTP emulation of the clock's REST API.
pub struct DeviceEmulator {
    state: Arc<Mutex<EmulatorState>>,
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl DeviceEmulator {
    /// Ephemeral loopback port, device time follows the system clock.
    pub fn start() -> Result<Self> {
        Self::bind("127.0.0.1:0", None)
    }

    /// Ephemeral loopback port with the device clock frozen at `unix_time`.
    pub fn start_with_time(unix_time: i64) -> Result<Self> {
        Self::bind("127.0.0.1:0", Some(unix_time))
    }

    pub fn bind(bind: &str, fixed_unix_time: Option<i64>) -> Result<Self> {
        let server = Server::http(bind)
            .map_err(|err| anyhow!("failed to start device emulator on {bind}: {err}"))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| anyhow!("device emulator on {bind} has no IP address"))?;
        let state = Arc::new(Mutex::new(EmulatorState {
            fixed_unix_time,
            timezones: builtin_timezone_table()?,
            ..EmulatorState::default()
        }));
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);
        let http_join =
            thread::spawn(move || run_server_loop(server, state_for_thread, stop_for_thread));
        info!("device emulator listening on http://{addr}");
        Ok(Self {
            state,
            addr,
            stop,
            http_join: Some(http_join),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Snapshot of the emulated device.
    pub fn state(&self) -> EmulatorState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn add_preset(&self, preset: Preset) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow!("device emulator state lock poisoned"))?;
        if guard.presets.iter().any(|existing| existing.value == preset.value) {
            bail!("preset {} already exists", preset.value);
        }
        guard.presets.push(preset);
        Ok(())
    }
}

impl Drop for DeviceEmulator {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(server: Server, state: Arc<Mutex<EmulatorState>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &state),
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}

/// Device reply: status plus either JSON or plain text.
enum Reply {
    Json(StatusCode, serde_json::Value),
    Text(StatusCode, String),
}

impl Reply {
    fn ok(text: &str) -> Self {
        Reply::Text(StatusCode(200), text.to_string())
    }

    fn error(status: u16, text: impl Into<String>) -> Self {
        Reply::Text(StatusCode(status), text.into())
    }

    fn json<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => Reply::Json(StatusCode(200), value),
            Err(err) => Reply::error(500, format!("failed to encode response: {err}")),
        }
    }
}

fn handle_request(mut request: tiny_http::Request, state: &Arc<Mutex<EmulatorState>>) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = split_path_query(&url);
    let mut body = String::new();
    if method == Method::Post && request.as_reader().read_to_string(&mut body).is_err() {
        let _ = send_text(request, StatusCode(400), "unreadable request body");
        return;
    }
    debug!("emulator {method} {url}");

    let reply = match state.lock() {
        Ok(mut guard) => route(&method, path, query, &body, &mut guard),
        Err(_) => Reply::error(500, "internal state lock error"),
    };
    let _ = match reply {
        Reply::Json(status, value) => send_json(request, status, &value),
        Reply::Text(status, text) => send_text(request, status, &text),
    };
}

fn route(
    method: &Method,
    path: &str,
    query: &str,
    body: &str,
    state: &mut EmulatorState,
) -> Reply {
    let form = parse_form(body);
    let field = |key: &str| {
        form.iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    };

    match (method, path) {
        (Method::Get, "/api/timezones") => {
            Reply::Json(StatusCode(200), state.timezones.to_wire_json())
        }
        (Method::Get, "/api/getPresets") => Reply::json(&state.presets),
        (Method::Get, "/api/settings") => Reply::json(&state.settings),
        (Method::Get, "/api/status") => Reply::json(&StatusReading {
            rssi: EMULATOR_RSSI,
            ssid: Some(EMULATOR_SSID.to_string()),
        }),
        (Method::Get, "/api/time") => Reply::json(&TimeReading {
            unix_time: Some(state.unix_time()),
            time_synchronized: state.time_synchronized,
            last_sync_time: state.last_sync_time.clone(),
            last_ntp_server: Some(EMULATOR_NTP_SERVER.to_string()),
        }),
        (Method::Get, "/api/previewSetting") => {
            let (Some(name), Some(value)) =
                (query_param(query, "setting"), query_param(query, "value"))
            else {
                return Reply::error(400, "Missing setting or value");
            };
            let Ok(setting) = name.parse::<SettingField>() else {
                return Reply::error(400, format!("Unknown setting: {name}"));
            };
            if !setting.is_previewable() {
                return Reply::error(400, format!("Setting cannot be previewed: {name}"));
            }
            let mut preview = state.settings.clone();
            if let Err(err) = preview.set(setting, &value) {
                return Reply::error(400, format!("{err:#}"));
            }
            state.last_preview = Some((setting.as_str().to_string(), value));
            Reply::ok("Preview applied")
        }
        (Method::Get, "/api/timeTravel") => {
            state.time_travel_count += 1;
            Reply::ok("Time travel sequence started")
        }
        (Method::Get, "/api/testSound") => {
            state.test_sound_count += 1;
            Reply::ok("Playing test sound")
        }
        (Method::Post, "/api/toggleGreatScottSound") => {
            state.settings.great_scott_sound_toggle = !state.settings.great_scott_sound_toggle;
            Reply::json(&GreatScottState {
                state: state.settings.great_scott_sound_toggle,
            })
        }
        (Method::Post, "/api/setLastDeparted") => {
            let Some(value) = query_param(query, "value") else {
                return Reply::error(400, "Missing value");
            };
            match value.parse::<LastDeparted>() {
                Ok(stamp) => {
                    state.last_departed = Some(stamp.to_string());
                    Reply::ok("Last departed time updated")
                }
                Err(err) => Reply::error(400, format!("{err:#}")),
            }
        }
        (Method::Post, "/api/addPreset") => {
            let name = field("name").unwrap_or("");
            let value = field("value").unwrap_or("");
            let preset = match Preset::new(name, value) {
                Ok(preset) => preset,
                Err(err) => return Reply::error(400, format!("{err:#}")),
            };
            if state.presets.iter().any(|existing| existing.value == preset.value) {
                return Reply::error(409, "Preset already exists");
            }
            state.presets.push(preset);
            Reply::ok("Preset added")
        }
        (Method::Post, "/api/updatePreset") => {
            let original = field("originalValue").unwrap_or("");
            let replacement =
                match Preset::new(field("newName").unwrap_or(""), field("newValue").unwrap_or("")) {
                    Ok(preset) => preset,
                    Err(err) => return Reply::error(400, format!("{err:#}")),
                };
            let Some(position) = state.presets.iter().position(|p| p.value == original) else {
                return Reply::error(404, "Preset not found");
            };
            let clashes = state
                .presets
                .iter()
                .enumerate()
                .any(|(index, p)| index != position && p.value == replacement.value);
            if clashes {
                return Reply::error(409, "Preset already exists");
            }
            state.presets[position] = replacement;
            Reply::ok("Preset updated")
        }
        (Method::Post, "/api/deletePreset") => {
            let value = field("value").unwrap_or("");
            let before = state.presets.len();
            state.presets.retain(|preset| preset.value != value);
            if state.presets.len() == before {
                return Reply::error(404, "Preset not found");
            }
            Reply::ok("Preset deleted")
        }
        (Method::Post, "/api/clearPresets") => {
            state.presets.clear();
            Reply::ok("All custom presets cleared")
        }
        (Method::Post, "/api/syncNtp") => {
            state.ntp_sync_count += 1;
            state.time_synchronized = true;
            state.last_sync_time = Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
            Reply::ok("NTP sync requested")
        }
        (Method::Post, "/api/saveSettings") => {
            let mut updated = state.settings.clone();
            let pairs = form.iter().map(|(key, value)| (key.as_str(), value.as_str()));
            if let Err(err) = updated.apply_form(pairs) {
                return Reply::error(400, format!("{err:#}"));
            }
            if let Some(issue) = updated.validate().first() {
                return Reply::error(400, format!("{}: {}", issue.field, issue.message));
            }
            state.settings = updated;
            Reply::ok("Settings saved!")
        }
        (Method::Post, "/api/resetSettings") => {
            state.settings = ClockSettings::default();
            Reply::ok("Settings reset to defaults")
        }
        (Method::Post, "/api/resetWifi") => {
            state.wifi_reset_count += 1;
            Reply::ok("WiFi settings reset. The device will restart in access point mode.")
        }
        (Method::Post, "/api/clearPreferences") => {
            state.settings = ClockSettings::default();
            state.presets.clear();
            state.last_departed = None;
            Reply::ok("All preferences cleared")
        }
        (_, path) if path.starts_with("/api/") => Reply::error(405, "method not allowed"),
        _ => Reply::error(404, "not found"),
    }
}

fn send_json(
    request: tiny_http::Request,
    status: StatusCode,
    body: &serde_json::Value,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn query_param(query: &str, key: &str) -> Option<String> {
    parse_form(query)
        .into_iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
}

/// Decodes an `application/x-www-form-urlencoded` string.
fn parse_form(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (percent_decode(key), percent_decode(value)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            b'%' => {
                let hex = input
                    .get(index + 1..index + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match hex {
                    Some(byte) => {
                        decoded.push(byte);
                        index += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        index += 1;
                    }
                }
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
