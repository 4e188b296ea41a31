use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use chrono::Utc;
use log::warn;

use crate::device::DeviceApi;

const HISTOGRAM_LABELS: &str = "<=10, <=25, <=50, <=100, <=250, >250 ms";

pub struct RttStats {
    samples: u64,
    failures: u64,
    last_rtt: Duration,
    window_size: usize,
    window: VecDeque<Duration>,
    rtt_histogram: [u64; 6],
}

impl RttStats {
    pub fn new(window_size: usize) -> Self {
        Self {
            samples: 0,
            failures: 0,
            last_rtt: Duration::ZERO,
            window_size: window_size.max(1),
            window: VecDeque::with_capacity(window_size.max(1)),
            rtt_histogram: [0; 6],
        }
    }

    pub fn record(&mut self, rtt: Duration) {
        self.samples += 1;
        self.last_rtt = rtt;
        if self.window.len() == self.window_size {
            let _ = self.window.pop_front();
        }
        self.window.push_back(rtt);
        self.update_histogram(rtt);
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn last_ms(&self) -> f64 {
        self.last_rtt.as_secs_f64() * 1_000.0
    }

    pub fn mean_ms(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let total: f64 = self.window.iter().map(Duration::as_secs_f64).sum();
        total / self.window.len() as f64 * 1_000.0
    }

    pub fn min_ms(&self) -> f64 {
        self.window
            .iter()
            .min()
            .map(|rtt| rtt.as_secs_f64() * 1_000.0)
            .unwrap_or(0.0)
    }

    pub fn max_ms(&self) -> f64 {
        self.window
            .iter()
            .max()
            .map(|rtt| rtt.as_secs_f64() * 1_000.0)
            .unwrap_or(0.0)
    }

    pub fn histogram(&self) -> [u64; 6] {
        self.rtt_histogram
    }

    fn update_histogram(&mut self, rtt: Duration) {
        let ms = rtt.as_secs_f64() * 1_000.0;
        let bucket = if ms <= 10.0 {
            0
        } else if ms <= 25.0 {
            1
        } else if ms <= 50.0 {
            2
        } else if ms <= 100.0 {
            3
        } else if ms <= 250.0 {
            4
        } else {
            5
        };
        self.rtt_histogram[bucket] += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClockOffset {
    /// Device clock minus local clock, whole seconds.
    pub seconds: i64,
    pub synchronized: bool,
}

/// Device clock against the local clock at the midpoint of the request.
pub fn clock_offset_seconds(device_unix: i64, sent_unix_ms: i64, received_unix_ms: i64) -> i64 {
    let midpoint_ms = sent_unix_ms + (received_unix_ms - sent_unix_ms) / 2;
    device_unix - midpoint_ms.div_euclid(1_000)
}

pub struct DiagnosticsReport {
    pub stats: RttStats,
    pub offset: Option<ClockOffset>,
}

pub fn probe_device<D: DeviceApi>(
    device: &D,
    samples: u32,
    interval: Duration,
) -> Result<DiagnosticsReport> {
    if samples == 0 {
        bail!("--samples must be greater than zero");
    }
    let mut stats = RttStats::new(samples as usize);
    let mut offset = None;
    for index in 0..samples {
        if index > 0 {
            thread::sleep(interval);
        }
        let sent_unix_ms = Utc::now().timestamp_millis();
        let started = Instant::now();
        match device.time() {
            Ok(reading) => {
                stats.record(started.elapsed());
                let received_unix_ms = Utc::now().timestamp_millis();
                if let Some(device_unix) = reading.present_unix() {
                    offset = Some(ClockOffset {
                        seconds: clock_offset_seconds(
                            device_unix,
                            sent_unix_ms,
                            received_unix_ms,
                        ),
                        synchronized: reading.time_synchronized,
                    });
                }
            }
            Err(err) => {
                warn!("time probe {} failed: {err}", index + 1);
                stats.record_failure();
            }
        }
    }
    if stats.samples() == 0 {
        bail!("device did not answer any of {samples} time probes");
    }
    Ok(DiagnosticsReport { stats, offset })
}

pub fn run_diagnostics<D: DeviceApi>(
    device: &D,
    device_url: &str,
    samples: u32,
    interval: Duration,
) -> Result<()> {
    println!("Time circuits diagnostics");
    println!("Device: {device_url}");
    println!("Probing /api/time {samples} times...");
    let report = probe_device(device, samples, interval)?;
    let stats = &report.stats;

    println!("Round-trip summary:");
    println!("  Answered: {}", stats.samples());
    println!("  Failed: {}", stats.failures());
    println!("  Last RTT: {:.1} ms", stats.last_ms());
    println!(
        "  Min/Mean/Max RTT: {:.1} / {:.1} / {:.1} ms",
        stats.min_ms(),
        stats.mean_ms(),
        stats.max_ms()
    );
    println!("  RTT histogram buckets ({HISTOGRAM_LABELS}):");
    println!("  {:?}", stats.histogram());
    match report.offset {
        Some(offset) => {
            println!("Clock offset (device - local): {:+} s", offset.seconds);
            println!(
                "Device NTP synchronized: {}",
                if offset.synchronized { "Yes" } else { "No" }
            );
        }
        None => println!("Clock offset: device reported no time"),
    }
    Ok(())
}
