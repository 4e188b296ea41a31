use serde::{Deserialize, Serialize};

/// Body of `/api/time`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeReading {
    pub unix_time: Option<i64>,
    pub time_synchronized: bool,
    pub last_sync_time: Option<String>,
    pub last_ntp_server: Option<String>,
}

impl TimeReading {
    /// Device time, treating a missing or zero reading as no data.
    pub fn present_unix(&self) -> Option<i64> {
        self.unix_time.filter(|&unix| unix != 0)
    }

    pub fn sync_label(&self) -> &'static str {
        if self.time_synchronized { "Yes" } else { "No" }
    }
}

/// Body of `/api/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusReading {
    pub rssi: i32,
    pub ssid: Option<String>,
}

impl StatusReading {
    pub fn ssid_label(&self) -> &str {
        match self.ssid.as_deref() {
            Some(ssid) if !ssid.is_empty() => ssid,
            _ => "N/A",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreatScottState {
    pub state: bool,
}
