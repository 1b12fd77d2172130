use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use failure::Fail;

use crate::time::Fraction;

pub const DEFAULT_SUBBEAT_DIVISOR: u16 = 480;

#[derive(Debug, Fail, PartialEq)]
#[fail(display = "Malformed bar-beat time: '{}'", literal)]
pub struct FormatError {
  literal: String,
}

impl FormatError {
  fn new(literal: &str) -> FormatError {
    FormatError {
      literal: literal.to_string(),
    }
  }
}

/// A musical position as bar, beat and subbeat, all of them 1-based.
///
/// The `subbeat_divisor` is the resolution in subbeats per beat (PPQN).
/// Two times with different divisors compare and hash by the value of their
/// normalized subbeat fraction, so `1.1.241/480 == 1.1.121/240`.
#[derive(Debug, Clone, Copy)]
pub struct BarBeatTime {
  bar: i32,
  beat: u16,
  subbeat: u16,
  subbeat_divisor: u16,
}

impl BarBeatTime {
  pub fn new(bar: i32, beat: u16, subbeat: u16, subbeat_divisor: u16) -> BarBeatTime {
    debug_assert!(beat >= 1 && subbeat >= 1 && subbeat_divisor > 0);
    debug_assert!(subbeat <= subbeat_divisor);
    BarBeatTime {
      bar,
      beat,
      subbeat,
      subbeat_divisor,
    }
  }

  /// Bar 1, beat 1, subbeat 1.
  pub fn start(subbeat_divisor: u16) -> BarBeatTime {
    BarBeatTime::new(1, 1, 1, subbeat_divisor)
  }

  pub fn from_ticks(ticks: u64, beats_per_bar: u16, subbeat_divisor: u16) -> BarBeatTime {
    let divisor = u64::from(subbeat_divisor.max(1));
    let beats_per_bar = u64::from(beats_per_bar.max(1));
    let total_beats = ticks / divisor;
    BarBeatTime {
      bar: (total_beats / beats_per_bar + 1) as i32,
      beat: (total_beats % beats_per_bar + 1) as u16,
      subbeat: (ticks % divisor + 1) as u16,
      subbeat_divisor: divisor as u16,
    }
  }

  /// Absolute ticks at this time's divisor. Times before bar 1 clamp to zero.
  pub fn to_ticks(&self, beats_per_bar: u16) -> u64 {
    self.to_signed_ticks(beats_per_bar).max(0) as u64
  }

  pub fn get_bar(&self) -> i32 {
    self.bar
  }

  pub fn get_beat(&self) -> u16 {
    self.beat
  }

  pub fn get_subbeat(&self) -> u16 {
    self.subbeat
  }

  pub fn get_subbeat_divisor(&self) -> u16 {
    self.subbeat_divisor
  }

  /// The position inside the beat as a fraction in `[0, 1)`.
  pub fn subbeat_fraction(&self) -> Fraction {
    Fraction::new(
      u64::from(self.subbeat.saturating_sub(1)),
      u64::from(self.subbeat_divisor),
    )
  }

  /// Re-expresses this time at another resolution, rounding the subbeat down.
  pub fn with_divisor(&self, subbeat_divisor: u16) -> BarBeatTime {
    if subbeat_divisor == self.subbeat_divisor {
      return *self;
    }
    let offset = u32::from(self.subbeat.saturating_sub(1)) * u32::from(subbeat_divisor)
      / u32::from(self.subbeat_divisor);
    BarBeatTime {
      subbeat: offset as u16 + 1,
      subbeat_divisor,
      ..*self
    }
  }

  /// Re-expresses this time in another meter, keeping its distance in ticks from the start.
  pub fn with_beats_per_bar(&self, from: u16, to: u16) -> BarBeatTime {
    if from == to {
      return *self;
    }
    BarBeatTime::from_signed_ticks(self.to_signed_ticks(from), to, self.subbeat_divisor)
  }

  /// Adds `other`, taken as an offset from bar 1, carrying subbeats into beats and beats into bars.
  ///
  /// The result keeps this time's divisor; `other` is normalized to it first.
  pub fn add(&self, other: &BarBeatTime, beats_per_bar: u16) -> BarBeatTime {
    let offset = u128::from(other.to_ticks(beats_per_bar)) * u128::from(self.subbeat_divisor)
      / u128::from(other.subbeat_divisor);
    BarBeatTime::from_signed_ticks(
      self.to_signed_ticks(beats_per_bar) + offset as i64,
      beats_per_bar,
      self.subbeat_divisor,
    )
  }

  fn to_signed_ticks(&self, beats_per_bar: u16) -> i64 {
    let divisor = i64::from(self.subbeat_divisor);
    let beats = i64::from(self.bar - 1) * i64::from(beats_per_bar) + i64::from(self.beat) - 1;
    beats * divisor + i64::from(self.subbeat) - 1
  }

  fn from_signed_ticks(ticks: i64, beats_per_bar: u16, subbeat_divisor: u16) -> BarBeatTime {
    let divisor = i64::from(subbeat_divisor);
    let per_bar = divisor * i64::from(beats_per_bar.max(1));
    let bar = ticks.div_euclid(per_bar);
    let in_bar = ticks.rem_euclid(per_bar);
    BarBeatTime {
      bar: (bar + 1) as i32,
      beat: (in_bar / divisor + 1) as u16,
      subbeat: (in_bar % divisor + 1) as u16,
      subbeat_divisor,
    }
  }
}

impl PartialEq for BarBeatTime {
  fn eq(&self, other: &BarBeatTime) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for BarBeatTime {}

impl PartialOrd for BarBeatTime {
  fn partial_cmp(&self, other: &BarBeatTime) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for BarBeatTime {
  fn cmp(&self, other: &BarBeatTime) -> Ordering {
    self
      .bar
      .cmp(&other.bar)
      .then(self.beat.cmp(&other.beat))
      .then_with(|| {
        if self.subbeat_divisor == other.subbeat_divisor {
          self.subbeat.cmp(&other.subbeat)
        } else {
          self.subbeat_fraction().cmp(&other.subbeat_fraction())
        }
      })
  }
}

impl Hash for BarBeatTime {
  fn hash<H: Hasher>(&self, state: &mut H) {
    let fraction = self.subbeat_fraction().reduced();
    self.bar.hash(state);
    self.beat.hash(state);
    fraction.numerator().hash(state);
    fraction.denominator().hash(state);
  }
}

impl fmt::Display for BarBeatTime {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}.{}.{}", self.bar, self.beat, self.subbeat)
  }
}

/// Parses `bar.beat.subbeat`, optionally followed by `/divisor`.
impl FromStr for BarBeatTime {
  type Err = FormatError;

  fn from_str(s: &str) -> Result<BarBeatTime, FormatError> {
    let literal = s.trim();
    let (position, divisor) = match literal.find('/') {
      Some(index) => {
        let divisor = literal[index + 1..]
          .parse::<u16>()
          .map_err(|_| FormatError::new(s))?;
        (&literal[..index], divisor)
      }
      None => (literal, DEFAULT_SUBBEAT_DIVISOR),
    };

    let parts: Vec<&str> = position.split('.').collect();
    if parts.len() != 3 || divisor == 0 {
      return Err(FormatError::new(s));
    }

    let bar = parts[0].parse::<i32>().map_err(|_| FormatError::new(s))?;
    let beat = parts[1].parse::<u16>().map_err(|_| FormatError::new(s))?;
    let subbeat = parts[2].parse::<u16>().map_err(|_| FormatError::new(s))?;
    if beat == 0 || subbeat == 0 || subbeat > divisor {
      return Err(FormatError::new(s));
    }

    Ok(BarBeatTime::new(bar, beat, subbeat, divisor))
  }
}
