use anyhow::{Result, bail};

use crate::settings::SettingField;

/// Everything the event loop reacts to, one at a time, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One-second refresh of time and status.
    Tick,
    /// Idle preset cycling advanced.
    CyclePreset,
    /// Delayed time re-read after an NTP sync request.
    RecheckTime,
    Update { field: SettingField, value: String },
    SelectPreset(String),
    SetLivePreview(bool),
    SyncNtp,
    Save,
    ToggleGreatScott,
    TimeTravel,
    Shutdown,
}

pub const COMMAND_HELP: &str = "commands: set <field> <value> | preset <value> | live on|off | \
                                 save | sync | great-scott | time-travel | quit";

/// Parses one line typed while watching. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Event>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();
    let event = match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("set", [field, value @ ..]) if !value.is_empty() => Event::Update {
            field: field.parse()?,
            value: value.join(" "),
        },
        ("preset", [value]) => Event::SelectPreset((*value).to_string()),
        ("live", [flag]) => match flag.to_ascii_lowercase().as_str() {
            "on" => Event::SetLivePreview(true),
            "off" => Event::SetLivePreview(false),
            other => bail!("live expects on or off, got '{other}'"),
        },
        ("save", []) => Event::Save,
        ("sync", []) => Event::SyncNtp,
        ("great-scott", []) => Event::ToggleGreatScott,
        ("time-travel", []) => Event::TimeTravel,
        ("quit" | "exit", []) => Event::Shutdown,
        _ => bail!("unrecognised command '{}'; {COMMAND_HELP}", line.trim()),
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_line_becomes_update() {
        assert_eq!(
            parse_command("set brightness 3").expect("parse"),
            Some(Event::Update {
                field: SettingField::Brightness,
                value: "3".to_string(),
            })
        );
        assert_eq!(
            parse_command("  SET displayFormat24h true ").expect("parse"),
            Some(Event::Update {
                field: SettingField::DisplayFormat24h,
                value: "true".to_string(),
            })
        );
    }

    #[test]
    fn single_word_commands_map_to_events() {
        let cases = [
            ("save", Event::Save),
            ("sync", Event::SyncNtp),
            ("great-scott", Event::ToggleGreatScott),
            ("time-travel", Event::TimeTravel),
            ("quit", Event::Shutdown),
            ("exit", Event::Shutdown),
            ("live on", Event::SetLivePreview(true)),
            ("live OFF", Event::SetLivePreview(false)),
            (
                "preset 1955-11-12-22-04",
                Event::SelectPreset("1955-11-12-22-04".to_string()),
            ),
        ];
        for (line, expected) in cases {
            assert_eq!(parse_command(line).expect(line), Some(expected));
        }
    }

    #[test]
    fn blank_line_is_ignored() {
        assert_eq!(parse_command("   ").expect("parse"), None);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        for line in ["set brightness", "set volume 3", "live maybe", "save now", "warp 88"] {
            assert!(parse_command(line).is_err(), "{line} should be rejected");
        }
    }
}
