use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "timecircuits",
    version,
    about = "Control surface for a time circuits display clock"
)]
pub struct Cli {
    /// Device base URL, e.g. http://192.168.4.1
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// JSON client config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the three time-circuit rows, refreshed every tick.
    ///
    /// Reads commands from stdin while running: `set <field> <value>`,
    /// `preset <value>`, `live on|off`, `save`, `sync`, `great-scott`,
    /// `time-travel` and `quit`.
    Watch {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
        /// Send setting changes to the device as they happen
        #[arg(long)]
        live_preview: bool,
        /// Plain output without theme colours
        #[arg(long)]
        no_color: bool,
    },
    /// Format a Unix timestamp in a timezone without talking to a device
    Format(FormatArgs),
    /// List the device's timezone options
    Timezones,
    /// WiFi status
    Status,
    /// Device time and NTP state
    Time,
    /// Read or change the device settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Apply a setting on the device without saving it
    Preview { setting: String, value: String },
    /// Manage custom presets
    Presets {
        #[command(subcommand)]
        action: PresetsAction,
    },
    /// Ask the device to resync with NTP
    SyncNtp,
    /// List themes, or select one and save it
    Theme { index: Option<i64> },
    /// Toggle the Great Scott sound
    GreatScott,
    /// Run the time travel sequence
    TimeTravel,
    /// Play the test sound
    TestSound,
    /// Forget the device WiFi credentials
    ResetWifi {
        #[arg(long)]
        yes: bool,
    },
    /// Measure request round trips and the device clock offset
    Diagnostics {
        #[arg(long, default_value_t = 5)]
        samples: u32,
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
    /// Serve an emulated device API
    Emulate {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Freeze the emulated clock at this Unix time
        #[arg(long)]
        fixed_time: Option<i64>,
    },
}

#[derive(Args, Debug)]
pub struct FormatArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub unix: i64,
    /// Timezone option index or IANA name
    #[arg(long)]
    pub zone: String,
    /// Timezone table JSON (defaults to the built-in table)
    #[arg(long)]
    pub timezones: Option<PathBuf>,
    #[arg(long = "24h")]
    pub hour24: bool,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the current settings
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Save a settings snapshot file (as printed by `show --json`)
    Save { file: PathBuf },
    /// Change fields and save, e.g. `brightness=3 displayFormat24h=true`
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
    /// Restore default settings
    Reset,
    /// Clear every saved preference on the device
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
pub struct PresetValueArgs {
    /// Stamp as YYYY-MM-DD-HH-MM
    #[arg(long, conflicts_with_all = ["date", "time"])]
    pub value: Option<String>,
    /// Date as YYYY-MM-DD, used with --time
    #[arg(long, requires = "time")]
    pub date: Option<String>,
    /// Time as HH:MM, used with --date
    #[arg(long, requires = "date")]
    pub time: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum PresetsAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[command(flatten)]
        stamp: PresetValueArgs,
    },
    Update {
        /// Value of the preset to change
        original: String,
        #[arg(long)]
        name: String,
        #[command(flatten)]
        stamp: PresetValueArgs,
    },
    Delete {
        value: String,
        #[arg(long)]
        yes: bool,
    },
    Clear,
    /// Set the last-departed time from a preset
    Select {
        value: String,
        /// Also save the settings so the selection persists
        #[arg(long)]
        save: bool,
    },
}
