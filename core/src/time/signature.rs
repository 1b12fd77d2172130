/// Default MIDI clocks per metronome click written in time signature events.
pub const CLOCKS_PER_CLICK: u8 = 24;

/// Default notated 32nd notes per quarter written in time signature events.
pub const THIRTY_SECONDS_PER_QUARTER: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
  beats_per_bar: u8, // numerator
  beat_unit: u8,     // denominator, a power of two
}

impl TimeSignature {
  pub fn new(beats_per_bar: u8, beat_unit: u8) -> TimeSignature {
    assert!(beats_per_bar > 0);
    assert!(beat_unit.is_power_of_two());
    TimeSignature {
      beats_per_bar,
      beat_unit,
    }
  }

  /// Builds a signature from the exponent stored in MIDI files, `beat_unit = 2^exponent`.
  pub fn from_exponent(beats_per_bar: u8, exponent: u8) -> Option<TimeSignature> {
    if beats_per_bar == 0 || exponent > 7 {
      None
    } else {
      Some(TimeSignature::new(beats_per_bar, 1u8 << exponent))
    }
  }

  pub fn get_beats_per_bar(&self) -> u8 {
    self.beats_per_bar
  }

  pub fn get_beat_unit(&self) -> u8 {
    self.beat_unit
  }

  /// `log2(beat_unit)`, exact because the unit is a power of two.
  pub fn exponent(&self) -> u8 {
    self.beat_unit.trailing_zeros() as u8
  }
}

impl Default for TimeSignature {
  fn default() -> TimeSignature {
    TimeSignature::new(4, 4)
  }
}
