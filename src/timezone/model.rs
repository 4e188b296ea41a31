use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneEntry {
    pub value: u32,
    pub display_label: String,
    pub iana_name: String,
    pub country: String,
}

/// Session timezone table, keyed by the device's stable option index.
#[derive(Debug, Clone, Default)]
pub struct TimezoneTable {
    entries: BTreeMap<u32, TimezoneEntry>,
}

impl TimezoneTable {
    pub fn from_entries(entries: Vec<TimezoneEntry>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for entry in entries {
            if entry.iana_name.trim().is_empty() {
                warn!("timezone option {} has an empty IANA name", entry.value);
            }
            let value = entry.value;
            if table.insert(value, entry).is_some() {
                bail!("duplicate timezone option value found: {value}");
            }
        }
        Ok(Self { entries: table })
    }

    pub fn get(&self, value: u32) -> Option<&TimezoneEntry> {
        self.entries.get(&value)
    }

    pub fn index_for(&self, iana_name: &str) -> Option<u32> {
        self.entries
            .values()
            .find(|entry| entry.iana_name == iana_name)
            .map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TimezoneEntry> {
        self.entries.values()
    }

    /// Entries grouped by country, groups in name order, entries by value.
    pub fn by_country(&self) -> Vec<(&str, Vec<&TimezoneEntry>)> {
        let mut groups: BTreeMap<&str, Vec<&TimezoneEntry>> = BTreeMap::new();
        for entry in self.entries.values() {
            groups.entry(entry.country.as_str()).or_default().push(entry);
        }
        groups.into_iter().collect()
    }

    pub fn to_wire_json(&self) -> Value {
        let mut countries = Map::new();
        for (country, entries) in self.by_country() {
            let options = entries
                .into_iter()
                .map(|entry| {
                    json!({
                        "value": entry.value,
                        "text": entry.display_label,
                        "ianaTzName": entry.iana_name,
                    })
                })
                .collect::<Vec<_>>();
            countries.insert(country.to_string(), Value::Array(options));
        }
        Value::Object(countries)
    }
}

pub fn load_timezone_table(path: &Path) -> Result<TimezoneTable> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read timezone file {}", path.display()))?;
    parse_timezone_table_text(&content)
}

pub fn parse_timezone_table_text(content: &str) -> Result<TimezoneTable> {
    let raw = serde_json::from_str::<BTreeMap<String, Vec<TimezoneOptionFile>>>(content).map_err(
        |err| {
            let line = err.line();
            let column = err.column();
            anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
        },
    )?;
    timezone_table_from_wire(raw)
}

pub(crate) fn timezone_table_from_wire(
    raw: BTreeMap<String, Vec<TimezoneOptionFile>>,
) -> Result<TimezoneTable> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (country, options) in raw {
        for option in options {
            if !seen.insert(option.value) {
                bail!("duplicate timezone option value found: {}", option.value);
            }
            entries.push(TimezoneEntry {
                value: option.value,
                display_label: option.text,
                iana_name: option.iana_tz_name,
                country: country.clone(),
            });
        }
    }
    TimezoneTable::from_entries(entries)
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct TimezoneOptionFile {
    value: u32,
    text: String,
    #[serde(rename = "ianaTzName")]
    iana_tz_name: String,
}
