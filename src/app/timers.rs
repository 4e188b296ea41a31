use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;

use crate::app::events::Event;

const POLL_SLICE: Duration = Duration::from_millis(25);

/// Background thread that posts an event on a fixed schedule.
///
/// Dropping the task stops and joins its thread. The shared `live` counter
/// tracks how many tasks are currently scheduled.
pub struct ScheduledTask {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    live: Arc<AtomicUsize>,
}

impl ScheduledTask {
    pub fn repeating(
        interval: Duration,
        event: Event,
        events: Sender<Event>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        Self::spawn(interval, true, event, events, live, None)
    }

    /// Repeating task that skips a beat while `in_flight` is set. The flag is
    /// raised on every post and the consumer lowers it once the event is
    /// handled, so at most one event is queued or being handled.
    pub fn repeating_gated(
        interval: Duration,
        event: Event,
        events: Sender<Event>,
        live: Arc<AtomicUsize>,
        in_flight: Arc<AtomicBool>,
    ) -> Self {
        Self::spawn(interval, true, event, events, live, Some(in_flight))
    }

    pub fn once(
        delay: Duration,
        event: Event,
        events: Sender<Event>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        Self::spawn(delay, false, event, events, live, None)
    }

    fn spawn(
        interval: Duration,
        repeat: bool,
        event: Event,
        events: Sender<Event>,
        live: Arc<AtomicUsize>,
        in_flight: Option<Arc<AtomicBool>>,
    ) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        live.fetch_add(1, Ordering::SeqCst);
        let join = thread::spawn(move || {
            run_schedule(interval, repeat, event, events, stop_for_thread, in_flight)
        });
        Self {
            stop,
            join: Some(join),
            live,
        }
    }

    /// True while the thread may still post events.
    pub fn is_pending(&self) -> bool {
        self.join
            .as_ref()
            .map(|join| !join.is_finished())
            .unwrap_or(false)
    }

    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_schedule(
    interval: Duration,
    repeat: bool,
    event: Event,
    events: Sender<Event>,
    stop: Arc<AtomicBool>,
    in_flight: Option<Arc<AtomicBool>>,
) {
    let mut next_fire = Instant::now() + interval;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= next_fire {
            let busy = in_flight
                .as_ref()
                .is_some_and(|flag| flag.swap(true, Ordering::SeqCst));
            if busy {
                debug!("previous {event:?} still in flight; skipping");
            } else if events.send(event.clone()).is_err() {
                debug!("event loop closed; stopping {event:?} schedule");
                return;
            }
            if !repeat {
                return;
            }
            while next_fire <= now {
                next_fire += interval;
            }
            continue;
        }
        thread::sleep(next_fire.saturating_duration_since(now).min(POLL_SLICE));
    }
}

/// Owns the idle preset-cycling schedule. Starting it again always cancels
/// the previous schedule first.
pub struct PresetCycler {
    task: Option<ScheduledTask>,
    live: Arc<AtomicUsize>,
}

impl Default for PresetCycler {
    fn default() -> Self {
        Self::new()
    }
}

impl PresetCycler {
    pub fn new() -> Self {
        Self {
            task: None,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cycles every `interval_minutes`; zero leaves cycling off.
    pub fn start(&mut self, interval_minutes: u32, events: &Sender<Event>) {
        if interval_minutes == 0 {
            self.stop();
            return;
        }
        let interval = Duration::from_secs(u64::from(interval_minutes) * 60);
        self.start_with_interval(interval, events);
    }

    pub fn start_with_interval(&mut self, interval: Duration, events: &Sender<Event>) {
        self.stop();
        debug!("preset cycling every {interval:?}");
        self.task = Some(ScheduledTask::repeating(
            interval,
            Event::CyclePreset,
            events.clone(),
            Arc::clone(&self.live),
        ));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("preset cycling cancelled");
            task.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn active_tasks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn starting_twice_leaves_one_active_task() {
        let (tx, _rx) = mpsc::channel();
        let mut cycler = PresetCycler::new();
        cycler.start(5, &tx);
        cycler.start(5, &tx);
        assert_eq!(cycler.active_tasks(), 1);
        cycler.start_with_interval(Duration::from_secs(60), &tx);
        assert_eq!(cycler.active_tasks(), 1);
        assert!(cycler.is_running());
    }

    #[test]
    fn zero_interval_stops_cycling() {
        let (tx, _rx) = mpsc::channel();
        let mut cycler = PresetCycler::new();
        cycler.start(1, &tx);
        cycler.start(0, &tx);
        assert_eq!(cycler.active_tasks(), 0);
        assert!(!cycler.is_running());
    }

    #[test]
    fn repeating_task_posts_until_cancelled() {
        let (tx, rx) = mpsc::channel();
        let live = Arc::new(AtomicUsize::new(0));
        let task =
            ScheduledTask::repeating(Duration::from_millis(10), Event::Tick, tx, Arc::clone(&live));
        for _ in 0..3 {
            let event = rx.recv_timeout(Duration::from_secs(2)).expect("tick");
            assert!(matches!(event, Event::Tick));
        }
        task.cancel();
        assert_eq!(live.load(Ordering::SeqCst), 0);
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(60)).is_err());
    }

    #[test]
    fn gated_task_waits_for_the_previous_event_to_be_handled() {
        let (tx, rx) = mpsc::channel();
        let in_flight = Arc::new(AtomicBool::new(false));
        let live = Arc::new(AtomicUsize::new(0));
        let task = ScheduledTask::repeating_gated(
            Duration::from_millis(5),
            Event::Tick,
            tx,
            live,
            Arc::clone(&in_flight),
        );
        rx.recv_timeout(Duration::from_secs(2)).expect("first tick");
        thread::sleep(Duration::from_millis(80));
        assert_eq!(rx.try_iter().count(), 0);

        in_flight.store(false, Ordering::SeqCst);
        rx.recv_timeout(Duration::from_secs(2)).expect("next tick");
        task.cancel();
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn one_shot_fires_once_after_delay() {
        let (tx, rx) = mpsc::channel();
        let live = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();
        let _task = ScheduledTask::once(Duration::from_millis(30), Event::RecheckTime, tx, live);
        let event = rx.recv_timeout(Duration::from_secs(2)).expect("recheck");
        assert!(matches!(event, Event::RecheckTime));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(rx.recv_timeout(Duration::from_millis(80)).is_err());
    }

    #[test]
    fn cycler_posts_cycle_events() {
        let (tx, rx) = mpsc::channel();
        let mut cycler = PresetCycler::new();
        cycler.start_with_interval(Duration::from_millis(10), &tx);
        let event = rx.recv_timeout(Duration::from_secs(2)).expect("cycle");
        assert!(matches!(event, Event::CyclePreset));
        cycler.stop();
        assert_eq!(cycler.active_tasks(), 0);
    }
}
