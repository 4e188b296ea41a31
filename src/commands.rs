use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};

use crate::app::App;
use crate::app::events::{Event, parse_command};
use crate::cli::{Cli, Command, FormatArgs, PresetValueArgs, PresetsAction, SettingsAction};
use crate::config::{ClientConfig, check_device_url, load_client_config};
use crate::device::{DeviceApi, HttpDevice};
use crate::diagnostics::run_diagnostics;
use crate::display::wifi_strength_level;
use crate::emulator::{DeviceEmulator, builtin_timezone_table};
use crate::presets::Preset;
use crate::render::render_screen;
use crate::settings::{ClockSettings, LastDeparted, SettingField};
use crate::theme::{self, THEMES};
use crate::timezone::formatter::TimeFormatter;
use crate::timezone::model::load_timezone_table;

pub fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => load_client_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &cli.device {
        check_device_url(url)?;
        config.device_url = url.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        if timeout_ms == 0 {
            bail!("--timeout-ms must be greater than zero");
        }
        config.request_timeout_ms = timeout_ms;
    }
    Ok(config)
}

pub fn execute(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let device = || HttpDevice::new(&config.device_url, config.request_timeout());

    match cli.command {
        Command::Watch {
            ticks,
            live_preview,
            no_color,
        } => watch(device(), config.clone(), ticks, live_preview, no_color),
        Command::Format(args) => format_offline(&args),
        Command::Timezones => list_timezones(&device()),
        Command::Status => show_status(&device()),
        Command::Time => show_time(&device()),
        Command::Settings { action } => settings_command(&device(), action),
        Command::Preview { setting, value } => {
            let field = setting.parse::<SettingField>()?;
            if !field.is_previewable() {
                bail!("{field} cannot be previewed");
            }
            print_reply(device().preview_setting(field, &value)?);
            Ok(())
        }
        Command::Presets { action } => presets_command(&device(), action),
        Command::SyncNtp => sync_ntp(&device(), config.ntp_recheck_delay()),
        Command::Theme { index } => theme_command(&device(), index),
        Command::GreatScott => {
            let toggle = device()
                .toggle_great_scott()
                .context("failed to toggle the Great Scott sound")?;
            println!(
                "Great Scott sound: {}",
                if toggle.state { "on" } else { "off" }
            );
            Ok(())
        }
        Command::TimeTravel => {
            print_reply(device().time_travel()?);
            Ok(())
        }
        Command::TestSound => {
            print_reply(device().test_sound()?);
            Ok(())
        }
        Command::ResetWifi { yes } => {
            confirm(yes, "reset the device WiFi settings")?;
            print_reply(device().reset_wifi()?);
            Ok(())
        }
        Command::Diagnostics {
            samples,
            interval_ms,
        } => run_diagnostics(
            &device(),
            &config.device_url,
            samples,
            Duration::from_millis(interval_ms),
        ),
        Command::Emulate {
            bind,
            port,
            fixed_time,
        } => emulate(&bind, port, fixed_time),
    }
}

fn confirm(yes: bool, action: &str) -> Result<()> {
    if !yes {
        bail!("refusing to {action} without --yes");
    }
    Ok(())
}

fn print_reply(text: String) {
    let text = text.trim();
    if !text.is_empty() {
        println!("{text}");
    }
}

fn watch(
    device: HttpDevice,
    config: ClientConfig,
    ticks: Option<u64>,
    live_preview: bool,
    no_color: bool,
) -> Result<()> {
    let color = !no_color && io::stdout().is_terminal();
    let mut app = App::new(device, config);
    app.bootstrap();
    app.handle(Event::SetLivePreview(live_preview));
    spawn_command_reader(app.sender());
    let mut stdout = io::stdout();
    app.run(ticks, |state| {
        if color {
            let _ = write!(stdout, "\x1b[2J\x1b[H");
        }
        let _ = write!(stdout, "{}", render_screen(state, color, Instant::now()));
        if !color {
            let _ = writeln!(stdout);
        }
        let _ = stdout.flush();
    })
}

fn spawn_command_reader(events: Sender<Event>) {
    thread::spawn(move || {
        let forwarded = forward_commands(io::stdin().lock(), &events);
        debug!("stdin closed after {forwarded} commands");
    });
}

/// Posts one event per typed command until input ends, the loop goes away
/// or `quit` is sent. Returns how many events were posted.
fn forward_commands<R: BufRead>(input: R, events: &Sender<Event>) -> usize {
    let mut forwarded = 0;
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        match parse_command(&line) {
            Ok(Some(event)) => {
                let quit = event == Event::Shutdown;
                if events.send(event).is_err() {
                    break;
                }
                forwarded += 1;
                if quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => eprintln!("{err:#}"),
        }
    }
    forwarded
}

fn format_offline(args: &FormatArgs) -> Result<()> {
    let table = match &args.timezones {
        Some(path) => load_timezone_table(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => builtin_timezone_table()?,
    };
    let index = match args.zone.parse::<u32>() {
        Ok(index) => index,
        Err(_) => table
            .index_for(&args.zone)
            .ok_or_else(|| anyhow!("timezone '{}' is not in the timezone table", args.zone))?,
    };
    let moment = TimeFormatter::new(&table).format(args.unix, index, args.hour24);
    println!("{}", moment.time);
    println!("{}", moment.date);
    Ok(())
}

fn list_timezones<D: DeviceApi>(device: &D) -> Result<()> {
    let table = device.timezones().context("failed to load time zones")?;
    for (country, entries) in table.by_country() {
        println!("{country}");
        for entry in entries {
            println!(
                "  {:>3}  {:<28} {}",
                entry.value, entry.display_label, entry.iana_name
            );
        }
    }
    Ok(())
}

fn show_status<D: DeviceApi>(device: &D) -> Result<()> {
    let status = device.status().context("failed to load status")?;
    println!("SSID: {}", status.ssid_label());
    println!(
        "Signal: {} dBm ({}/4)",
        status.rssi,
        wifi_strength_level(status.rssi)
    );
    Ok(())
}

fn show_time<D: DeviceApi>(device: &D) -> Result<()> {
    let reading = device.time().context("failed to load device time")?;
    match reading.present_unix() {
        Some(unix) => println!("Unix time: {unix}"),
        None => println!("Unix time: not set"),
    }
    println!("NTP synchronized: {}", reading.sync_label());
    println!(
        "Last sync: {}",
        reading.last_sync_time.as_deref().unwrap_or("-")
    );
    println!(
        "Last NTP server: {}",
        reading.last_ntp_server.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn settings_command<D: DeviceApi>(device: &D, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show { json } => {
            let settings = device.settings().context("failed to load settings")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                for field in SettingField::ALL {
                    println!("{:<28} {}", field.as_str(), settings.get(field));
                }
                println!(
                    "{:<28} {}",
                    "lastDeparted",
                    settings.last_departed().summary()
                );
            }
            Ok(())
        }
        SettingsAction::Save { file } => {
            let settings = load_settings_file(&file)?;
            save_validated(device, &settings)
        }
        SettingsAction::Set { assignments } => {
            let mut settings = device.settings().context("failed to load settings")?;
            for assignment in &assignments {
                let (name, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected FIELD=VALUE, got '{assignment}'"))?;
                let field = name.parse::<SettingField>()?;
                settings.set(field, value)?;
            }
            save_validated(device, &settings)
        }
        SettingsAction::Reset => {
            print_reply(device.reset_settings().context("failed to reset settings")?);
            Ok(())
        }
        SettingsAction::Clear { yes } => {
            confirm(yes, "clear all device preferences")?;
            print_reply(
                device
                    .clear_preferences()
                    .context("failed to clear preferences")?,
            );
            Ok(())
        }
    }
}

fn load_settings_file(path: &Path) -> Result<ClockSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read settings file {}", path.display()))?;
    serde_json::from_str::<ClockSettings>(&content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })
}

fn save_validated<D: DeviceApi>(device: &D, settings: &ClockSettings) -> Result<()> {
    let issues = settings.validate();
    if !issues.is_empty() {
        let details = issues
            .iter()
            .map(|issue| format!("{}: {}", issue.field, issue.message))
            .collect::<Vec<_>>()
            .join("; ");
        bail!("settings not saved, invalid inputs: {details}");
    }
    print_reply(
        device
            .save_settings(settings)
            .context("failed to save settings")?,
    );
    Ok(())
}

fn preset_value(stamp: &PresetValueArgs) -> Result<String> {
    match (&stamp.value, &stamp.date, &stamp.time) {
        (Some(value), _, _) => Ok(value.parse::<LastDeparted>()?.to_string()),
        (None, Some(date), Some(time)) => {
            Ok(LastDeparted::from_date_and_time(date, time)?.to_string())
        }
        _ => bail!("provide --value YYYY-MM-DD-HH-MM or --date YYYY-MM-DD --time HH:MM"),
    }
}

fn presets_command<D: DeviceApi>(device: &D, action: PresetsAction) -> Result<()> {
    match action {
        PresetsAction::List => {
            let presets = device.presets().context("failed to load presets")?;
            if presets.is_empty() {
                println!("No custom presets.");
                return Ok(());
            }
            let current = device
                .settings()
                .map(|settings| settings.last_departed().to_string())
                .ok();
            for preset in presets {
                let marker = if current.as_deref() == Some(preset.value.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!("{marker} {}  {}", preset.value, preset.name);
            }
            Ok(())
        }
        PresetsAction::Add { name, stamp } => {
            let preset = Preset::new(&name, &preset_value(&stamp)?)?;
            print_reply(device.add_preset(&preset).context("failed to add preset")?);
            Ok(())
        }
        PresetsAction::Update {
            original,
            name,
            stamp,
        } => {
            let preset = Preset::new(&name, &preset_value(&stamp)?)?;
            print_reply(
                device
                    .update_preset(&original, &preset)
                    .context("failed to update preset")?,
            );
            Ok(())
        }
        PresetsAction::Delete { value, yes } => {
            confirm(yes, &format!("delete preset {value}"))?;
            print_reply(
                device
                    .delete_preset(&value)
                    .context("failed to delete preset")?,
            );
            Ok(())
        }
        PresetsAction::Clear => {
            print_reply(device.clear_presets().context("failed to clear presets")?);
            Ok(())
        }
        PresetsAction::Select { value, save } => {
            let presets = device.presets().context("failed to load presets")?;
            let preset = presets
                .iter()
                .find(|preset| preset.value == value)
                .ok_or_else(|| anyhow!("no preset with value {value}"))?;
            let stamp = preset.stamp()?;
            print_reply(
                device
                    .set_last_departed(&stamp)
                    .context("failed to set last departed time")?,
            );
            if save {
                let mut settings = device.settings().context("failed to load settings")?;
                settings.set_last_departed(&stamp);
                save_validated(device, &settings)?;
            }
            println!("Last departed: {}", stamp.summary());
            Ok(())
        }
    }
}

fn sync_ntp<D: DeviceApi>(device: &D, recheck_delay: Duration) -> Result<()> {
    print_reply(device.sync_ntp().context("failed to request NTP sync")?);
    thread::sleep(recheck_delay);
    let reading = device.time().context("failed to re-read device time")?;
    println!("NTP synchronized: {}", reading.sync_label());
    Ok(())
}

fn theme_command<D: DeviceApi>(device: &D, index: Option<i64>) -> Result<()> {
    let Some(index) = index else {
        for theme in &THEMES {
            println!("{}  {:<15} {}", theme.index, theme.name, theme.swatch);
        }
        return Ok(());
    };
    let theme = theme::by_index(index)
        .ok_or_else(|| anyhow!("theme index {index} is out of range 0-{}", THEMES.len() - 1))?;
    let mut settings = device.settings().context("failed to load settings")?;
    settings.theme = u32::from(theme.index);
    save_validated(device, &settings)?;
    println!("Theme: {}", theme.name);
    Ok(())
}

fn emulate(bind: &str, port: u16, fixed_time: Option<i64>) -> Result<()> {
    let emulator = DeviceEmulator::bind(&format!("{bind}:{port}"), fixed_time)?;
    println!("Emulated device listening on {}", emulator.base_url());
    info!("press Ctrl+C to stop");
    loop {
        thread::park();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;

    use super::*;
    use clap::Parser;

    #[test]
    fn typed_commands_reach_the_event_queue_until_quit() {
        let (tx, rx) = mpsc::channel();
        let input = Cursor::new("set brightness 2\n\nwarp 88\nlive on\nsave\nquit\nsync\n");
        assert_eq!(forward_commands(input, &tx), 4);
        let events: Vec<Event> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                Event::Update {
                    field: SettingField::Brightness,
                    value: "2".to_string(),
                },
                Event::SetLivePreview(true),
                Event::Save,
                Event::Shutdown,
            ]
        );
    }

    #[test]
    fn preset_value_accepts_stamp_or_date_and_time() {
        let stamp = PresetValueArgs {
            value: Some("1985-10-26-01-21".to_string()),
            date: None,
            time: None,
        };
        assert_eq!(preset_value(&stamp).expect("value"), "1985-10-26-01-21");

        let stamp = PresetValueArgs {
            value: None,
            date: Some("1955-11-12".to_string()),
            time: Some("22:04".to_string()),
        };
        assert_eq!(preset_value(&stamp).expect("value"), "1955-11-12-22-04");

        let stamp = PresetValueArgs {
            value: None,
            date: None,
            time: None,
        };
        assert!(preset_value(&stamp).is_err());
    }

    #[test]
    fn cli_flags_override_config_file() {
        let cli = Cli::parse_from([
            "timecircuits",
            "--device",
            "10.0.0.9",
            "--timeout-ms",
            "900",
            "status",
        ]);
        let config = resolve_config(&cli).expect("config");
        assert_eq!(config.device_url, "10.0.0.9");
        assert_eq!(config.request_timeout_ms, 900);
    }

    #[test]
    fn destructive_actions_need_confirmation() {
        assert!(confirm(false, "reset the device WiFi settings").is_err());
        assert!(confirm(true, "reset the device WiFi settings").is_ok());
    }

    #[test]
    fn commands_drive_emulated_device() {
        let emulator = DeviceEmulator::start().expect("emulator");
        let device = HttpDevice::new(&emulator.base_url(), Duration::from_secs(2));

        settings_command(
            &device,
            SettingsAction::Set {
                assignments: vec!["brightness=1".to_string(), "theme=4".to_string()],
            },
        )
        .expect("set");
        assert_eq!(emulator.state().settings.brightness, 1);
        assert_eq!(emulator.state().settings.theme, 4);

        let err = settings_command(
            &device,
            SettingsAction::Set {
                assignments: vec!["notificationVolume=99".to_string()],
            },
        )
        .expect_err("out of range");
        assert!(err.to_string().contains("notificationVolume"));

        presets_command(
            &device,
            PresetsAction::Add {
                name: "Lightning".to_string(),
                stamp: PresetValueArgs {
                    value: None,
                    date: Some("1955-11-12".to_string()),
                    time: Some("22:04".to_string()),
                },
            },
        )
        .expect("add");
        presets_command(
            &device,
            PresetsAction::Select {
                value: "1955-11-12-22-04".to_string(),
                save: true,
            },
        )
        .expect("select");
        let state = emulator.state();
        assert_eq!(state.last_departed.as_deref(), Some("1955-11-12-22-04"));
        assert_eq!(state.settings.last_time_departed_year, 1955);

        theme_command(&device, Some(2)).expect("theme");
        assert_eq!(emulator.state().settings.theme, 2);
        assert!(theme_command(&device, Some(9)).is_err());
    }
}
