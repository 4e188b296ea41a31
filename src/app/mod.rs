pub mod events;
pub mod state;
pub mod timers;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};

use crate::app::events::Event;
use crate::app::state::{AppState, BannerKind};
use crate::app::timers::{PresetCycler, ScheduledTask};
use crate::config::ClientConfig;
use crate::device::{DeviceApi, DeviceError};
use crate::settings::SettingField;

const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Control-surface session against one device.
///
/// All state changes happen inside [`App::handle`], called from a single
/// loop draining one event queue. Timers only post events.
pub struct App<D: DeviceApi> {
    device: D,
    config: ClientConfig,
    state: AppState,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    ticker: Option<ScheduledTask>,
    tick_in_flight: Arc<AtomicBool>,
    cycler: PresetCycler,
    delayed: Vec<ScheduledTask>,
    delayed_live: Arc<AtomicUsize>,
}

impl<D: DeviceApi> App<D> {
    pub fn new(device: D, config: ClientConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            device,
            config,
            state: AppState::default(),
            events_tx,
            events_rx,
            ticker: None,
            tick_in_flight: Arc::new(AtomicBool::new(false)),
            cycler: PresetCycler::new(),
            delayed: Vec::new(),
            delayed_live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Handle for posting events from outside the loop.
    pub fn sender(&self) -> Sender<Event> {
        self.events_tx.clone()
    }

    pub fn cycler(&self) -> &PresetCycler {
        &self.cycler
    }

    /// Loads timezones, then presets, then settings, then the first reading.
    /// A failed step shows a banner and loading carries on.
    pub fn bootstrap(&mut self) {
        match self.device.timezones() {
            Ok(table) => {
                debug!("loaded {} timezone options", table.len());
                self.state.set_timezones(table);
            }
            Err(err) => self.report_failure("Error loading time zones!", &err),
        }
        match self.device.presets() {
            Ok(presets) => self.state.replace_presets(presets),
            Err(err) => self.report_failure("Error loading custom presets!", &err),
        }
        match self.device.settings() {
            Ok(settings) => {
                self.state.apply_settings(settings);
                self.restart_cycler();
            }
            Err(err) => self.report_failure("Error loading settings!", &err),
        }
        self.refresh_time();
    }

    /// Fetches status and time, then rebuilds the rows.
    pub fn refresh_time(&mut self) {
        match self.device.status() {
            Ok(status) => self.state.record_status(status),
            Err(err) => warn!("status fetch failed: {err}"),
        }
        match self.device.time() {
            Ok(reading) => self.state.record_time(reading),
            Err(err) => warn!("time fetch failed: {err}"),
        }
    }

    /// Applies one event. Returns false once the loop should stop.
    pub fn handle(&mut self, event: Event) -> bool {
        debug!("handling {event:?}");
        self.delayed.retain(ScheduledTask::is_pending);
        match event {
            Event::Tick | Event::RecheckTime => self.refresh_time(),
            Event::CyclePreset => {
                if let Some(value) = self.state.cycle_preset() {
                    self.select_preset(&value);
                }
            }
            Event::Update { field, value } => self.update_setting(field, &value),
            Event::SelectPreset(value) => self.select_preset(&value),
            Event::SetLivePreview(enabled) => self.state.set_live_preview(enabled),
            Event::SyncNtp => self.sync_ntp(),
            Event::Save => self.save(),
            Event::ToggleGreatScott => match self.device.toggle_great_scott() {
                Ok(toggle) => self.state.apply_great_scott(toggle.state),
                Err(err) => self.report_failure("Error toggling Great Scott sound!", &err),
            },
            Event::TimeTravel => {
                if let Err(err) = self.device.time_travel() {
                    self.report_failure("Error starting time travel!", &err);
                }
            }
            Event::Shutdown => return false,
        }
        true
    }

    /// Drains events until shutdown or until `max_ticks` ticks were handled.
    /// `render` runs once up front and after every handled event. A tick is
    /// only posted once the previous one was handled, so a slow device
    /// delays ticks instead of queueing them.
    pub fn run<F>(&mut self, max_ticks: Option<u64>, mut render: F) -> Result<()>
    where
        F: FnMut(&AppState),
    {
        self.tick_in_flight.store(false, Ordering::SeqCst);
        self.ticker = Some(ScheduledTask::repeating_gated(
            self.config.tick_interval(),
            Event::Tick,
            self.events_tx.clone(),
            Arc::new(AtomicUsize::new(0)),
            Arc::clone(&self.tick_in_flight),
        ));
        info!(
            "event loop started, tick every {:?}",
            self.config.tick_interval()
        );
        render(&self.state);

        let mut ticks = 0_u64;
        loop {
            let event = match self.events_rx.recv_timeout(IDLE_WAIT) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let is_tick = event == Event::Tick;
            let keep_going = self.handle(event);
            if is_tick {
                self.tick_in_flight.store(false, Ordering::SeqCst);
            }
            if !keep_going {
                break;
            }
            render(&self.state);
            if is_tick {
                ticks += 1;
                if max_ticks.is_some_and(|limit| ticks >= limit) {
                    break;
                }
            }
        }

        self.ticker = None;
        info!("event loop stopped after {ticks} ticks");
        Ok(())
    }

    fn update_setting(&mut self, field: SettingField, value: &str) {
        if let Err(err) = self.state.update_setting(field, value) {
            self.state.show_banner(
                format!("{err:#}"),
                BannerKind::Error,
                self.config.banner_duration(),
            );
            return;
        }
        if field == SettingField::PresetCycleInterval {
            self.restart_cycler();
        }
        if !self.state.live_preview()
            || !field.is_previewable()
            || self.state.is_field_invalid(field)
        {
            return;
        }

        let value = self.state.settings().get(field);
        match self.device.preview_setting(field, &value) {
            Ok(_) => {
                if field.affects_time_rows() {
                    self.refresh_time();
                }
            }
            Err(err) => {
                let detail = err
                    .device_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                warn!("live preview of {field} failed: {err}");
                self.state.show_banner(
                    format!("Live preview failed for {field}: {detail}"),
                    BannerKind::Error,
                    self.config.banner_duration(),
                );
            }
        }
    }

    fn select_preset(&mut self, value: &str) {
        let stamp = match self.state.select_preset(value) {
            Ok(stamp) => stamp,
            Err(err) => {
                self.state.show_banner(
                    format!("{err:#}"),
                    BannerKind::Error,
                    self.config.banner_duration(),
                );
                return;
            }
        };
        if !self.state.live_preview() {
            return;
        }
        match self.device.set_last_departed(&stamp) {
            Ok(_) => self.refresh_time(),
            Err(err) => warn!("live preview of last departed {stamp} failed: {err}"),
        }
    }

    fn sync_ntp(&mut self) {
        match self.device.sync_ntp() {
            Ok(text) => {
                self.state
                    .show_banner(text, BannerKind::Success, self.config.banner_duration());
                self.delayed.push(ScheduledTask::once(
                    self.config.ntp_recheck_delay(),
                    Event::RecheckTime,
                    self.events_tx.clone(),
                    Arc::clone(&self.delayed_live),
                ));
            }
            Err(err) => self.report_failure("Error requesting NTP sync!", &err),
        }
    }

    fn save(&mut self) {
        if !self.state.save_enabled() {
            let text = if self.state.any_input_invalid() {
                "Fix invalid settings before saving."
            } else {
                "No changes to save."
            };
            self.state
                .show_banner(text, BannerKind::Error, self.config.banner_duration());
            return;
        }
        match self.device.save_settings(self.state.settings()) {
            Ok(text) => {
                self.state
                    .show_banner(text, BannerKind::Success, self.config.banner_duration());
                self.state.mark_saved();
                if let Err(err) = self.device.time_travel() {
                    warn!("time travel sequence after save failed: {err}");
                }
            }
            Err(err) => self.report_failure("Error saving settings!", &err),
        }
    }

    fn restart_cycler(&mut self) {
        self.cycler
            .start(self.state.settings().preset_cycle_interval, &self.events_tx);
    }

    fn report_failure(&mut self, text: &str, err: &DeviceError) {
        warn!("{text} {err}");
        self.state
            .show_banner(text, BannerKind::Error, self.config.banner_duration());
    }
}
