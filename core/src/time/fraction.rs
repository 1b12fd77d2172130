use std::cmp::Ordering;

pub fn gcd(a: u64, b: u64) -> u64 {
  gcd_wide(u128::from(a), u128::from(b)) as u64
}

fn gcd_wide(mut a: u128, mut b: u128) -> u128 {
  while b != 0 {
    let r = a % b;
    a = b;
    b = r;
  }
  a
}

/// A non-negative rational number.
///
/// Equality and ordering compare the represented value, so `1/2 == 2/4`.
#[derive(Debug, Clone, Copy)]
pub struct Fraction {
  numerator: u64,
  denominator: u64,
}

impl Fraction {
  pub fn new(numerator: u64, denominator: u64) -> Fraction {
    assert!(denominator > 0);
    Fraction {
      numerator,
      denominator,
    }
  }

  pub fn zero(denominator: u64) -> Fraction {
    Fraction::new(0, denominator)
  }

  pub fn numerator(&self) -> u64 {
    self.numerator
  }

  pub fn denominator(&self) -> u64 {
    self.denominator
  }

  pub fn is_zero(&self) -> bool {
    self.numerator == 0
  }

  pub fn reduced(&self) -> Fraction {
    if self.numerator == 0 {
      return Fraction::new(0, 1);
    }
    let d = gcd(self.numerator, self.denominator);
    Fraction::new(self.numerator / d, self.denominator / d)
  }

  /// Increments the numerator, leaving the denominator untouched.
  pub fn increment(&mut self) {
    self.numerator += 1;
  }

  /// Remainder after removing whole multiples of `other`.
  pub fn rem(&self, other: &Fraction) -> Fraction {
    let den = u128::from(self.denominator) * u128::from(other.denominator);
    let a = u128::from(self.numerator) * u128::from(other.denominator);
    let b = u128::from(other.numerator) * u128::from(self.denominator);
    let num = if b == 0 { a } else { a % b };
    let d = gcd_wide(num, den);
    Fraction::new((num / d) as u64, (den / d) as u64)
  }
}

impl PartialEq for Fraction {
  fn eq(&self, other: &Fraction) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Fraction {}

impl PartialOrd for Fraction {
  fn partial_cmp(&self, other: &Fraction) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Fraction {
  fn cmp(&self, other: &Fraction) -> Ordering {
    let lhs = u128::from(self.numerator) * u128::from(other.denominator);
    let rhs = u128::from(other.numerator) * u128::from(self.denominator);
    lhs.cmp(&rhs)
  }
}
