use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub index: u8,
    pub name: &'static str,
    pub css_class: &'static str,
    pub swatch: &'static str,
}

pub const THEMES: [Theme; 6] = [
    Theme {
        index: 0,
        name: "Time Circuits",
        css_class: "theme-time-circuits",
        swatch: "#00ff00",
    },
    Theme {
        index: 1,
        name: "OUTATIME",
        css_class: "theme-outatime",
        swatch: "#ff0000",
    },
    Theme {
        index: 2,
        name: "88 MPH",
        css_class: "theme-88mph",
        swatch: "#00ffff",
    },
    Theme {
        index: 3,
        name: "Plutonium Glow",
        css_class: "theme-plutonium-glow",
        swatch: "#a0ffa0",
    },
    Theme {
        index: 4,
        name: "Mr. Fusion",
        css_class: "theme-mr-fusion",
        swatch: "#ff8c00",
    },
    Theme {
        index: 5,
        name: "Clock Tower",
        css_class: "theme-clock-tower",
        swatch: "#daa520",
    },
];

/// Out-of-range indexes select no theme.
pub fn by_index(index: i64) -> Option<&'static Theme> {
    usize::try_from(index).ok().and_then(|index| THEMES.get(index))
}

impl Theme {
    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        let hex = self.swatch.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
        Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// ANSI truecolor foreground escape for terminal rendering.
    pub fn ansi_foreground(&self) -> String {
        match self.rgb() {
            Some((r, g, b)) => format!("\x1b[38;2;{r};{g};{b}m"),
            None => String::new(),
        }
    }
}
