use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::settings::LastDeparted;

/// A named jump target. `value` is a `YYYY-MM-DD-HH-MM` stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub value: String,
}

impl Preset {
    pub fn new(name: &str, value: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            bail!("preset name must not be empty");
        }
        value.parse::<LastDeparted>()?;
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    pub fn stamp(&self) -> Result<LastDeparted> {
        self.value.parse()
    }
}

/// Presets as fetched from the device plus the current selection.
#[derive(Debug, Clone, Default)]
pub struct PresetList {
    presets: Vec<Preset>,
    selected: Option<usize>,
}

impl PresetList {
    pub fn replace(&mut self, presets: Vec<Preset>) {
        let previous = self.selected_preset().map(|preset| preset.value.clone());
        self.presets = presets;
        self.selected = None;
        if let Some(value) = previous {
            self.select_value(&value);
        }
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn find(&self, value: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.value == value)
    }

    /// Selects the first preset with `value`; clears the selection when none matches.
    pub fn select_value(&mut self, value: &str) -> Option<&Preset> {
        self.selected = self.presets.iter().position(|preset| preset.value == value);
        self.selected_preset()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_preset(&self) -> Option<&Preset> {
        self.selected.and_then(|index| self.presets.get(index))
    }

    /// Advances the selection, wrapping back to the first preset.
    pub fn cycle_next(&mut self) -> Option<&Preset> {
        if self.presets.is_empty() {
            self.selected = None;
            return None;
        }
        let next = match self.selected {
            Some(index) if index + 1 < self.presets.len() => index + 1,
            _ => 0,
        };
        self.selected = Some(next);
        self.presets.get(next)
    }
}
