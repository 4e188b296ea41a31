use std::fmt::Write as _;
use std::time::Instant;

use crate::app::state::{AppState, BannerKind};
use crate::display::{
    CircuitRows, HeaderRow, ScheduleBar, sleep_schedule_bars, wifi_strength_level,
};
use crate::theme;

const ANSI_RESET: &str = "\x1b[0m";
const SCHEDULE_WIDTH: usize = 48;

fn render_row(label: &str, row: &HeaderRow) -> String {
    let meridiem = if row.meridiem.is_empty() {
        String::new()
    } else {
        format!(" {}", row.meridiem)
    };
    format!(
        "{label:<17} {} {} {}  {}:{}:{}{meridiem}",
        row.month, row.day, row.year, row.hour, row.minute, row.second
    )
}

pub fn render_rows(rows: &CircuitRows) -> Vec<String> {
    vec![
        render_row("DESTINATION TIME", &rows.destination),
        render_row("PRESENT TIME", &rows.present),
        render_row("LAST TIME DEPARTED", &rows.last_departed),
    ]
}

pub fn render_placeholder_rows() -> Vec<String> {
    let placeholder = HeaderRow::placeholder();
    vec![
        render_row("DESTINATION TIME", &placeholder),
        render_row("PRESENT TIME", &placeholder),
        render_row("LAST TIME DEPARTED", &placeholder),
    ]
}

/// 24h strip: `#` while asleep, `|` at the current time.
pub fn render_schedule_strip(bars: &[ScheduleBar], marker_percent: Option<f64>) -> String {
    let mut cells = vec!['.'; SCHEDULE_WIDTH];
    let to_cell = |percent: f64| {
        let cell = (percent / 100.0 * SCHEDULE_WIDTH as f64).round() as usize;
        cell.min(SCHEDULE_WIDTH)
    };
    for bar in bars {
        let start = to_cell(bar.left_percent);
        let end = to_cell(bar.left_percent + bar.width_percent);
        for cell in cells.iter_mut().take(end).skip(start) {
            *cell = '#';
        }
    }
    if let Some(percent) = marker_percent {
        let index = to_cell(percent).min(SCHEDULE_WIDTH - 1);
        cells[index] = '|';
    }
    cells.into_iter().collect()
}

pub fn render_status_line(state: &AppState) -> String {
    let mut line = String::new();
    match state.status() {
        Some(status) => {
            let level = usize::from(wifi_strength_level(status.rssi));
            let _ = write!(
                line,
                "WiFi {} [{}{}] {} dBm",
                status.ssid_label(),
                "#".repeat(level),
                ".".repeat(4 - level),
                status.rssi
            );
        }
        None => line.push_str("WiFi N/A"),
    }
    match state.time() {
        Some(time) => {
            let _ = write!(
                line,
                " | NTP synced: {} | Last sync: {} | Server: {}",
                time.sync_label(),
                time.last_sync_time.as_deref().unwrap_or("-"),
                time.last_ntp_server.as_deref().unwrap_or("-"),
            );
        }
        None => line.push_str(" | NTP synced: -"),
    }
    line
}

/// Full watch screen. `color` wraps the rows in the selected theme colour.
pub fn render_screen(state: &AppState, color: bool, now: Instant) -> String {
    let mut out = String::new();
    let rows = match state.rows() {
        Some(rows) => render_rows(rows),
        None => render_placeholder_rows(),
    };
    let theme = theme::by_index(i64::from(state.settings().theme));
    for row in rows {
        match theme {
            Some(theme) if color => {
                let _ = writeln!(out, "{}{row}{ANSI_RESET}", theme.ansi_foreground());
            }
            _ => {
                let _ = writeln!(out, "{row}");
            }
        }
    }

    let settings = state.settings();
    let bars = sleep_schedule_bars(
        (settings.departure_hour, settings.departure_minute),
        (settings.arrival_hour, settings.arrival_minute),
    );
    let marker = state.rows().and_then(|rows| rows.day_marker_percent);
    let _ = writeln!(
        out,
        "Sleep {:02}:{:02}-{:02}:{:02} [{}]",
        settings.departure_hour,
        settings.departure_minute,
        settings.arrival_hour,
        settings.arrival_minute,
        render_schedule_strip(&bars, marker)
    );
    let _ = writeln!(
        out,
        "Last departed: {}",
        settings.last_departed().summary()
    );
    let _ = writeln!(out, "{}", render_status_line(state));

    if let Some(banner) = state.active_banner(now) {
        let tag = match banner.kind {
            BannerKind::Success => "OK",
            BannerKind::Error => "ERROR",
        };
        let _ = writeln!(out, "[{tag}] {}", banner.text);
    }
    out
}
