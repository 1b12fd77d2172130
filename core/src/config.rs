use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SequencerConfig {
  /// Subbeats per quarter note (PPQN).
  pub resolution: u16,
  /// Initial tempo in beats per minute.
  pub tempo: u16,
  pub beats_per_bar: u8,
  pub beat_unit: u8,
}

impl Default for SequencerConfig {
  fn default() -> SequencerConfig {
    SequencerConfig {
      resolution: 480,
      tempo: 120,
      beats_per_bar: 4,
      beat_unit: 4,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ClockConfig {
  pub realtime_priority: bool,
  pub priority_buffer_frames: u32,
  pub priority_sample_rate: u32,
}

impl Default for ClockConfig {
  fn default() -> ClockConfig {
    ClockConfig {
      realtime_priority: true,
      priority_buffer_frames: 512,
      priority_sample_rate: 44100,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
  pub sequencer: SequencerConfig,
  pub clock: ClockConfig,
}

impl Default for Config {
  fn default() -> Config {
    Config {
      sequencer: SequencerConfig::default(),
      clock: ClockConfig::default(),
    }
  }
}

impl Config {
  pub fn from_file<'a, T>(path: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let mut content = String::new();
    let path_str = path.into();
    let mut file = File::open(path_str)?;
    file.read_to_string(&mut content)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
  }

  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }
}
