use std::sync::Arc;

use parking_lot::RwLock;

use crate::time::{BarBeatTime, Fraction};

pub type TrackerLock = Arc<RwLock<BarBeatTracker>>;

/// Time of a shared tracker, read through its lock.
pub fn snapshot(tracker: &TrackerLock) -> BarBeatTime {
  tracker.read().time()
}

/// Advances a bar-beat time from clock pulses.
///
/// `clock_count` is the position inside the current bar as a fraction whose
/// denominator is the number of pulses per bar. A beat boundary is reached
/// every `beat_interval` pulses, one beat being `subbeat_divisor` pulses.
#[derive(Debug, Clone)]
pub struct BarBeatTracker {
  clock_count: Fraction,
  beat_interval: Fraction,
  time: BarBeatTime,
  beats_per_bar: u16,
}

impl BarBeatTracker {
  pub fn new(subbeat_divisor: u16, beats_per_bar: u16) -> BarBeatTracker {
    let subbeat_divisor = subbeat_divisor.max(1);
    let beats_per_bar = beats_per_bar.max(1);
    let pulses_per_bar = u64::from(subbeat_divisor) * u64::from(beats_per_bar);
    BarBeatTracker {
      clock_count: Fraction::zero(pulses_per_bar),
      beat_interval: Fraction::new(u64::from(subbeat_divisor), pulses_per_bar),
      time: BarBeatTime::start(subbeat_divisor),
      beats_per_bar,
    }
  }

  pub fn new_lock(subbeat_divisor: u16, beats_per_bar: u16) -> TrackerLock {
    Arc::new(RwLock::new(BarBeatTracker::new(subbeat_divisor, beats_per_bar)))
  }

  pub fn time(&self) -> BarBeatTime {
    self.time
  }

  pub fn clock_count(&self) -> Fraction {
    self.clock_count
  }

  pub fn beat_interval(&self) -> Fraction {
    self.beat_interval
  }

  pub fn subbeat_divisor(&self) -> u16 {
    self.time.get_subbeat_divisor()
  }

  pub fn beats_per_bar(&self) -> u16 {
    self.beats_per_bar
  }

  fn pulses_per_bar(&self) -> u64 {
    self.clock_count.denominator()
  }

  /// Handles one clock pulse.
  pub fn pulse(&mut self) {
    self.clock_count.increment();
    let bar = self.time.get_bar();
    let beat = self.time.get_beat();
    let subbeat = self.time.get_subbeat();
    let divisor = self.subbeat_divisor();

    self.time = if self.clock_count.numerator() == self.pulses_per_bar() {
      self.clock_count = Fraction::zero(self.pulses_per_bar());
      BarBeatTime::new(bar + 1, 1, 1, divisor)
    } else if self.clock_count.rem(&self.beat_interval).is_zero() {
      BarBeatTime::new(bar, beat + 1, 1, divisor)
    } else {
      BarBeatTime::new(bar, beat, subbeat + 1, divisor)
    };
  }

  /// Copies time and clock count from `other`, adopting its resolution and meter.
  pub fn synchronize(&mut self, other: &BarBeatTracker) {
    self.clock_count = other.clock_count;
    self.beat_interval = other.beat_interval;
    self.time = other.time;
    self.beats_per_bar = other.beats_per_bar;
  }

  /// Moves to `time`, converted to this tracker's resolution.
  pub fn set_time(&mut self, time: BarBeatTime) {
    let time = time.with_divisor(self.subbeat_divisor());
    let ticks = time.to_ticks(self.beats_per_bar);
    let pulses_per_bar = self.pulses_per_bar();
    self.clock_count = Fraction::new(ticks % pulses_per_bar, pulses_per_bar);
    self.time = BarBeatTime::from_ticks(ticks, self.beats_per_bar, self.subbeat_divisor());
  }

  /// Changes the meter, keeping the absolute tick position.
  pub fn set_beats_per_bar(&mut self, beats_per_bar: u16) {
    let ticks = self.time.to_ticks(self.beats_per_bar);
    let divisor = self.subbeat_divisor();
    *self = BarBeatTracker::new(divisor, beats_per_bar);
    self.set_time(BarBeatTime::from_ticks(ticks, self.beats_per_bar, divisor));
  }

  /// Back to bar 1, beat 1, subbeat 1.
  pub fn reset(&mut self) {
    self.clock_count = Fraction::zero(self.pulses_per_bar());
    self.time = BarBeatTime::start(self.subbeat_divisor());
  }
}
