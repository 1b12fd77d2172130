use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use failure::Fail;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::ClockConfig;
use crate::time::realtime::RealTimePriority;
use crate::time::Tempo;

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MICRO: u64 = 1_000;

/// Below this distance to the next deadline the clock thread spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_micros(200);

/// Upper bound of a single sleep, so that stopping a slow clock stays responsive.
const MAX_SLEEP: Duration = Duration::from_millis(5);

///! High resolution time, in nanoseconds
#[derive(Debug, PartialOrd, Ord, PartialEq, Eq, Clone, Copy)]
pub struct ClockTime(u64);

impl ClockTime {
  pub fn zero() -> ClockTime {
    ClockTime(0)
  }

  pub fn new(nanos: u64) -> ClockTime {
    ClockTime(nanos)
  }

  pub fn from_seconds(seconds: f64) -> ClockTime {
    ClockTime((seconds * NANOS_PER_SECOND as f64).round() as u64)
  }

  /// Interval between two pulses, `(60e9 / bpm) / resolution` nanoseconds.
  pub fn pulse_interval(tempo: Tempo, resolution: u16) -> ClockTime {
    ClockTime::pulse_offset(1, tempo, resolution)
  }

  /// Offset of the n-th pulse from the first one.
  ///
  /// Computed from the pulse count rather than by summing intervals, so that
  /// the truncation of a single interval never accumulates.
  pub fn pulse_offset(pulses: u64, tempo: Tempo, resolution: u16) -> ClockTime {
    let nanos_per_quarter = u128::from(tempo.get_micros_per_quarter()) * u128::from(NANOS_PER_MICRO);
    let nanos = u128::from(pulses) * nanos_per_quarter / u128::from(resolution.max(1));
    ClockTime(nanos as u64)
  }

  pub fn to_nanos(&self) -> u64 {
    self.0
  }

  pub fn to_seconds(&self) -> f64 {
    self.0 as f64 / NANOS_PER_SECOND as f64
  }

  pub fn to_duration(&self) -> Duration {
    Duration::from_nanos(self.0)
  }
}

impl Add for ClockTime {
  type Output = ClockTime;

  fn add(self, rhs: ClockTime) -> ClockTime {
    ClockTime(self.0 + rhs.0)
  }
}

impl Sub for ClockTime {
  type Output = ClockTime;

  fn sub(self, rhs: ClockTime) -> ClockTime {
    ClockTime(self.0.saturating_sub(rhs.0))
  }
}

/// Payload of every clock emission, one MIDI real-time status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
  Start,
  Clock,
  Stop,
}

impl Pulse {
  pub fn status(&self) -> u8 {
    match self {
      Pulse::Clock => 0xf8,
      Pulse::Start => 0xfa,
      Pulse::Stop => 0xfc,
    }
  }
}

pub type PulseHandler = Box<dyn FnMut(Pulse) + Send>;

#[derive(Debug, Fail)]
pub enum ClockError {
  #[fail(display = "Clock operation '{}' requires the clock to be stopped", operation)]
  State { operation: &'static str },

  #[fail(display = "Failed to create the clock thread: {}", cause)]
  Start { cause: String },

  #[fail(display = "Failed to join the clock thread")]
  Stop,
}

struct ClockShared {
  micros_per_quarter: AtomicU32,
  running: AtomicBool,
  pulses: AtomicU64,
  handler: Mutex<Option<PulseHandler>>,
}

impl ClockShared {
  fn tempo(&self) -> Tempo {
    Tempo::from_micros_per_quarter(self.micros_per_quarter.load(Ordering::Acquire))
  }

  fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  fn emit(&self, pulse: Pulse) {
    if let Some(handler) = self.handler.lock().as_mut() {
      handler(pulse);
    }
  }
}

/// Changes the tempo of a running clock from another thread.
#[derive(Clone)]
pub struct TempoControl {
  shared: Arc<ClockShared>,
}

impl TempoControl {
  pub fn set_tempo(&self, tempo: Tempo) {
    self
      .shared
      .micros_per_quarter
      .store(tempo.get_micros_per_quarter(), Ordering::Release);
  }

  pub fn tempo(&self) -> Tempo {
    self.shared.tempo()
  }
}

struct ClockThread {
  shared: Arc<ClockShared>,
  resolution: u16,
  config: ClockConfig,
}

impl ClockThread {
  fn run(self) {
    let _priority = self.promote_to_real_time();

    self.shared.emit(Pulse::Start);

    let mut origin = Instant::now();
    let mut tempo = self.shared.tempo();
    let mut emitted = 0u64;

    while self.shared.is_running() {
      let current = self.shared.tempo();
      if current != tempo {
        origin += ClockTime::pulse_offset(emitted, tempo, self.resolution).to_duration();
        emitted = 0;
        tempo = current;
      }

      let deadline =
        origin + ClockTime::pulse_offset(emitted + 1, tempo, self.resolution).to_duration();
      if !self.wait_until(deadline) {
        break;
      }

      self.shared.pulses.fetch_add(1, Ordering::AcqRel);
      self.shared.emit(Pulse::Clock);
      emitted += 1;
    }

    self.shared.emit(Pulse::Stop);
  }

  fn wait_until(&self, deadline: Instant) -> bool {
    loop {
      if !self.shared.is_running() {
        return false;
      }
      let now = Instant::now();
      if now >= deadline {
        return true;
      }
      let remaining = deadline - now;
      if remaining > SPIN_THRESHOLD {
        thread::sleep((remaining - SPIN_THRESHOLD).min(MAX_SLEEP));
      } else {
        std::hint::spin_loop();
      }
    }
  }

  fn promote_to_real_time(&self) -> Option<RealTimePriority> {
    if !self.config.realtime_priority {
      return None;
    }
    match RealTimePriority::promote(self.config.priority_buffer_frames, self.config.priority_sample_rate) {
      Ok(priority) => {
        debug!("Clock thread has now real-time priority");
        Some(priority)
      }
      Err(err) => {
        warn!("Couldn't promote the clock thread into real time: {}", err);
        None
      }
    }
  }
}

/// Periodic pulse generator running on its own thread.
///
/// Emits [`Pulse::Start`] when started, one [`Pulse::Clock`] per subbeat at the
/// current tempo and resolution, and [`Pulse::Stop`] once stopped. The pulse
/// counter is reset on every start and by [`ClockSource::reset`].
pub struct ClockSource {
  resolution: u16,
  config: ClockConfig,
  shared: Arc<ClockShared>,
  thread: Option<JoinHandle<()>>,
}

impl ClockSource {
  pub fn new(resolution: u16, tempo: Tempo, config: ClockConfig) -> ClockSource {
    let shared = ClockShared {
      micros_per_quarter: AtomicU32::new(tempo.get_micros_per_quarter()),
      running: AtomicBool::new(false),
      pulses: AtomicU64::new(0),
      handler: Mutex::new(None),
    };

    ClockSource {
      resolution: resolution.max(1),
      config,
      shared: Arc::new(shared),
      thread: None,
    }
  }

  pub fn set_handler<F>(&mut self, handler: F)
  where
    F: FnMut(Pulse) + Send + 'static,
  {
    *self.shared.handler.lock() = Some(Box::new(handler));
  }

  pub fn resolution(&self) -> u16 {
    self.resolution
  }

  pub fn tempo(&self) -> Tempo {
    self.shared.tempo()
  }

  /// Takes effect from the next pulse when running.
  pub fn set_tempo(&self, tempo: Tempo) {
    self.tempo_control().set_tempo(tempo);
  }

  pub fn tempo_control(&self) -> TempoControl {
    TempoControl {
      shared: self.shared.clone(),
    }
  }

  pub fn tick_interval(&self) -> ClockTime {
    ClockTime::pulse_interval(self.tempo(), self.resolution)
  }

  pub fn pulses(&self) -> u64 {
    self.shared.pulses.load(Ordering::Acquire)
  }

  pub fn is_running(&self) -> bool {
    self.shared.is_running()
  }

  pub fn start(&mut self) -> Result<(), ClockError> {
    if self.is_running() {
      return Ok(());
    }

    info!(
      "Starting clock at {:.2} bpm and {} ppqn ...",
      self.tempo().get_beats_per_minute(),
      self.resolution
    );

    self.shared.pulses.store(0, Ordering::Release);
    self.shared.running.store(true, Ordering::Release);

    let clock_thread = ClockThread {
      shared: self.shared.clone(),
      resolution: self.resolution,
      config: self.config.clone(),
    };

    match thread::Builder::new()
      .name("clock".into())
      .spawn(move || clock_thread.run())
    {
      Ok(handle) => {
        self.thread = Some(handle);
        Ok(())
      }
      Err(err) => {
        self.shared.running.store(false, Ordering::Release);
        Err(ClockError::Start {
          cause: err.to_string(),
        })
      }
    }
  }

  pub fn stop(&mut self) -> Result<(), ClockError> {
    self.shared.running.store(false, Ordering::Release);
    match self.thread.take() {
      Some(handle) => {
        info!("Stopping clock ...");
        handle.join().map_err(|_| ClockError::Stop)
      }
      None => Ok(()),
    }
  }

  pub fn reset(&mut self) -> Result<(), ClockError> {
    if self.is_running() {
      return Err(ClockError::State { operation: "reset" });
    }
    self.shared.pulses.store(0, Ordering::Release);
    Ok(())
  }

  /// Emits `count` clock pulses synchronously on the calling thread.
  ///
  /// Drives the same handler as the clock thread, for offline rendering and tests.
  pub fn emit_pulses(&self, count: u64) -> Result<(), ClockError> {
    if self.is_running() {
      return Err(ClockError::State {
        operation: "emit_pulses",
      });
    }
    for _ in 0..count {
      self.shared.pulses.fetch_add(1, Ordering::AcqRel);
      self.shared.emit(Pulse::Clock);
    }
    Ok(())
  }
}

impl Drop for ClockSource {
  fn drop(&mut self) {
    drop(self.stop());
  }
}

#[cfg(test)]
mod test {

  use std::sync::Arc;
  use std::thread;
  use std::time::Duration;

  use parking_lot::Mutex;

  use super::{ClockError, ClockSource, ClockTime, Pulse};
  use crate::config::ClockConfig;
  use crate::time::Tempo;

  fn config() -> ClockConfig {
    ClockConfig {
      realtime_priority: false,
      ..ClockConfig::default()
    }
  }

  fn recording_clock() -> (ClockSource, Arc<Mutex<Vec<Pulse>>>) {
    let pulses = Arc::new(Mutex::new(Vec::new()));
    let mut clock = ClockSource::new(480, Tempo::new(120), config());
    let sink = pulses.clone();
    clock.set_handler(move |pulse| sink.lock().push(pulse));
    (clock, pulses)
  }

  #[test]
  pub fn clock_time_sub_saturates() {
    assert_eq!(ClockTime::new(5) - ClockTime::new(15), ClockTime::zero());
    assert_eq!(ClockTime::new(15) - ClockTime::new(5), ClockTime::new(10));
  }

  #[test]
  pub fn pulse_interval() {
    let interval = ClockTime::pulse_interval(Tempo::new(120), 480);
    assert_eq!(interval.to_nanos(), 1_041_666);
  }

  #[test]
  pub fn pulse_offset_does_not_accumulate() {
    let offset = ClockTime::pulse_offset(480, Tempo::new(120), 480);
    assert_eq!(offset.to_nanos(), 500_000_000);
    let summed = ClockTime::pulse_interval(Tempo::new(120), 480).to_nanos() * 480;
    assert!(summed < offset.to_nanos());
  }

  #[test]
  pub fn pulse_status() {
    assert_eq!(Pulse::Clock.status(), 0xf8);
    assert_eq!(Pulse::Start.status(), 0xfa);
    assert_eq!(Pulse::Stop.status(), 0xfc);
  }

  #[test]
  pub fn emit_pulses() {
    let (clock, pulses) = recording_clock();
    clock.emit_pulses(3).unwrap();
    assert_eq!(clock.pulses(), 3);
    assert_eq!(*pulses.lock(), vec![Pulse::Clock, Pulse::Clock, Pulse::Clock]);
  }

  #[test]
  pub fn start_and_stop() {
    let (mut clock, pulses) = recording_clock();
    clock.start().unwrap();
    clock.start().unwrap();
    assert!(clock.is_running());
    thread::sleep(Duration::from_millis(30));
    clock.stop().unwrap();
    clock.stop().unwrap();
    assert!(!clock.is_running());

    let pulses = pulses.lock();
    assert_eq!(pulses.first(), Some(&Pulse::Start));
    assert_eq!(pulses.last(), Some(&Pulse::Stop));
    let clocks = pulses.iter().filter(|p| **p == Pulse::Clock).count() as u64;
    assert!(clocks > 0);
    assert_eq!(clocks, clock.pulses());
  }

  #[test]
  pub fn reset_requires_stopped_clock() {
    let (mut clock, _pulses) = recording_clock();
    clock.emit_pulses(10).unwrap();
    clock.start().unwrap();
    match clock.reset() {
      Err(ClockError::State { operation }) => assert_eq!(operation, "reset"),
      _ => panic!("reset must fail while running"),
    }
    assert!(clock.emit_pulses(1).is_err());
    clock.stop().unwrap();
    clock.reset().unwrap();
    assert_eq!(clock.pulses(), 0);
  }

  #[test]
  pub fn start_resets_counter() {
    let (mut clock, _pulses) = recording_clock();
    clock.emit_pulses(1000).unwrap();
    clock.start().unwrap();
    clock.stop().unwrap();
    assert!(clock.pulses() < 1000);
  }

  #[test]
  pub fn set_tempo() {
    let (clock, _pulses) = recording_clock();
    clock.tempo_control().set_tempo(Tempo::new(60));
    assert_eq!(clock.tempo().get_value(), 60);
    assert_eq!(clock.tick_interval().to_nanos(), 2_083_333);
  }
}
