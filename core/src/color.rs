/// Colours assigned to tracks, in the order new tracks receive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackColor {
  MuddyWaters,
  SteelBlue,
  Celery,
  Chestnut,
  CrayonPurple,
  Verdigris,
  Twine,
  Tapestry,
  VegasGold,
  RichBlue,
  FruitSalad,
  Husk,
}

impl TrackColor {
  pub const ALL: [TrackColor; 12] = [
    TrackColor::MuddyWaters,
    TrackColor::SteelBlue,
    TrackColor::Celery,
    TrackColor::Chestnut,
    TrackColor::CrayonPurple,
    TrackColor::Verdigris,
    TrackColor::Twine,
    TrackColor::Tapestry,
    TrackColor::VegasGold,
    TrackColor::RichBlue,
    TrackColor::FruitSalad,
    TrackColor::Husk,
  ];

  /// Cycles through the palette.
  pub fn for_index(index: usize) -> TrackColor {
    TrackColor::ALL[index % TrackColor::ALL.len()]
  }

  pub fn rgb(&self) -> u32 {
    match self {
      TrackColor::MuddyWaters => 0xbd7651,
      TrackColor::SteelBlue => 0x4875a8,
      TrackColor::Celery => 0x9fb44d,
      TrackColor::Chestnut => 0xba5055,
      TrackColor::CrayonPurple => 0x8048a8,
      TrackColor::Verdigris => 0x48a4a8,
      TrackColor::Twine => 0xbd8f51,
      TrackColor::Tapestry => 0xab4a8d,
      TrackColor::VegasGold => 0xbdba51,
      TrackColor::RichBlue => 0x5048a8,
      TrackColor::FruitSalad => 0x53a949,
      TrackColor::Husk => 0xbda451,
    }
  }

  pub fn components(&self) -> (u8, u8, u8) {
    let rgb = self.rgb();
    ((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
  }

  pub fn css(&self) -> String {
    let (r, g, b) = self.components();
    format!("rgb({},{},{})", r, g, b)
  }
}

#[cfg(test)]
mod test {

  use super::TrackColor;

  #[test]
  pub fn for_index_cycles() {
    assert_eq!(TrackColor::for_index(0), TrackColor::MuddyWaters);
    assert_eq!(TrackColor::for_index(11), TrackColor::Husk);
    assert_eq!(TrackColor::for_index(13), TrackColor::SteelBlue);
  }

  #[test]
  pub fn css() {
    assert_eq!(TrackColor::SteelBlue.components(), (0x48, 0x75, 0xa8));
    assert_eq!(TrackColor::SteelBlue.css(), "rgb(72,117,168)");
  }
}
