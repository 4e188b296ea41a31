use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::device::client::DEFAULT_DEVICE_URL;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_NTP_RECHECK_DELAY_MS: u64 = 1_000;
pub const DEFAULT_BANNER_DURATION_MS: u64 = 3_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub device_url: String,
    pub request_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub ntp_recheck_delay_ms: u64,
    pub banner_duration_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_url: DEFAULT_DEVICE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            ntp_recheck_delay_ms: DEFAULT_NTP_RECHECK_DELAY_MS,
            banner_duration_ms: DEFAULT_BANNER_DURATION_MS,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn ntp_recheck_delay(&self) -> Duration {
        Duration::from_millis(self.ntp_recheck_delay_ms)
    }

    pub fn banner_duration(&self) -> Duration {
        Duration::from_millis(self.banner_duration_ms)
    }
}

pub fn load_client_config(path: &Path) -> Result<ClientConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    parse_client_config_text(&content)
}

pub fn parse_client_config_text(content: &str) -> Result<ClientConfig> {
    let raw = serde_json::from_str::<ClientConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported client config version {}; expected version 1",
            raw.version
        );
    }
    check_device_url(&raw.device_url)?;
    if raw.request_timeout_ms == 0 {
        bail!("request_timeout_ms must be > 0");
    }
    if raw.tick_interval_ms == 0 {
        bail!("tick_interval_ms must be > 0");
    }

    Ok(ClientConfig {
        device_url: raw.device_url,
        request_timeout_ms: raw.request_timeout_ms,
        tick_interval_ms: raw.tick_interval_ms,
        ntp_recheck_delay_ms: raw.ntp_recheck_delay_ms,
        banner_duration_ms: raw.banner_duration_ms,
    })
}

/// The device serves plain HTTP and the client is built without TLS.
pub fn check_device_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        bail!("device_url must not be empty");
    }
    if url
        .get(..8)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
    {
        bail!("device_url '{url}' uses https; the device only serves plain http");
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ClientConfigFile {
    version: u32,
    #[serde(default = "default_device_url")]
    device_url: String,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    tick_interval_ms: u64,
    #[serde(default = "default_ntp_recheck_delay_ms")]
    ntp_recheck_delay_ms: u64,
    #[serde(default = "default_banner_duration_ms")]
    banner_duration_ms: u64,
}

fn default_device_url() -> String {
    DEFAULT_DEVICE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_ntp_recheck_delay_ms() -> u64 {
    DEFAULT_NTP_RECHECK_DELAY_MS
}

fn default_banner_duration_ms() -> u64 {
    DEFAULT_BANNER_DURATION_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = parse_client_config_text(r#"{ "version": 1 }"#).expect("valid config");
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn reads_all_fields() {
        let config = parse_client_config_text(
            r#"{
  "version": 1,
  "device_url": "http://192.168.4.1",
  "request_timeout_ms": 750,
  "tick_interval_ms": 500,
  "ntp_recheck_delay_ms": 2000,
  "banner_duration_ms": 4000
}"#,
        )
        .expect("valid config");
        assert_eq!(config.device_url, "http://192.168.4.1");
        assert_eq!(config.request_timeout(), Duration::from_millis(750));
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.ntp_recheck_delay(), Duration::from_secs(2));
        assert_eq!(config.banner_duration(), Duration::from_secs(4));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = parse_client_config_text(r#"{ "version": 2 }"#).expect_err("should fail");
        assert!(err.to_string().contains("unsupported client config version 2"));
    }

    #[test]
    fn rejects_zero_tick_interval() {
        let err = parse_client_config_text(r#"{ "version": 1, "tick_interval_ms": 0 }"#)
            .expect_err("should fail");
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn rejects_https_device_url() {
        let err = parse_client_config_text(
            r#"{ "version": 1, "device_url": "HTTPS://clock.local" }"#,
        )
        .expect_err("should fail");
        assert!(err.to_string().contains("plain http"));
        assert!(check_device_url("http://clock.local").is_ok());
        assert!(check_device_url("192.168.4.1").is_ok());
    }

    #[test]
    fn malformed_json_reports_position() {
        let err = parse_client_config_text("{ \"version\": ").expect_err("should fail");
        assert!(err.to_string().contains("invalid JSON at line 1"));
    }
}
