pub const MICROS_PER_MINUTE: u32 = 60_000_000;

/// Tempo stored the way MIDI files do, as microseconds per quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tempo(u32);

impl Tempo {
  pub fn new(beats_per_minute: u16) -> Tempo {
    Tempo(MICROS_PER_MINUTE / u32::from(beats_per_minute.max(1)))
  }

  pub fn from_micros_per_quarter(micros: u32) -> Tempo {
    Tempo(micros.max(1))
  }

  pub fn get_micros_per_quarter(&self) -> u32 {
    self.0
  }

  pub fn get_beats_per_minute(&self) -> f64 {
    f64::from(MICROS_PER_MINUTE) / f64::from(self.0)
  }

  /// Rounded beats per minute.
  pub fn get_value(&self) -> u16 {
    let micros = u64::from(self.0);
    ((u64::from(MICROS_PER_MINUTE) + micros / 2) / micros).min(u64::from(u16::MAX)) as u16
  }
}

impl Default for Tempo {
  fn default() -> Tempo {
    Tempo::new(120)
  }
}

impl From<Tempo> for f64 {
  fn from(item: Tempo) -> Self {
    item.get_beats_per_minute()
  }
}
