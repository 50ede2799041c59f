//! Source and measurement ranges, and selection of the smallest range covering a value.

use std::fmt;

/// Which physical quantity a channel forces or measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Quantity {
    #[default]
    Voltage,
    Current,
}

impl Quantity {
    /// The quantity a source of this kind limits with its compliance.
    pub fn opposite(self) -> Quantity {
        match self {
            Self::Voltage => Self::Current,
            Self::Current => Self::Voltage,
        }
    }
}

/// A range as the instrument encodes it: `0` is full auto ranging, a positive ceiling code is
/// auto ranging limited from below by that ceiling, a negative one fixes the range.
///
/// Ceiling codes for voltage ranges are ten times the ceiling in volts (`50` is 5 V); current
/// ranges are numbered along a decade ladder from `8` (1 pA) to `20` (1 A), followed by `21`
/// (2 A), `22` (20 A) and `23` (40 A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Range {
    #[default]
    Auto,
    Limited(u32),
    Fixed(u32),
}

impl Range {
    pub fn from_code(code: i32) -> Range {
        match code {
            0 => Self::Auto,
            code if code > 0 => Self::Limited(code as u32),
            code => Self::Fixed(code.unsigned_abs()),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Auto => 0,
            Self::Limited(ceiling) => ceiling as i32,
            Self::Fixed(ceiling) => -(ceiling as i32),
        }
    }

    pub fn ceiling_code(self) -> Option<u32> {
        match self {
            Self::Auto => None,
            Self::Limited(ceiling) | Self::Fixed(ceiling) => Some(ceiling),
        }
    }

    /// Largest magnitude this range can represent, or `None` for full auto and unknown codes.
    pub fn ceiling(self, quantity: Quantity) -> Option<f64> {
        let code = self.ceiling_code()?;
        ladder(quantity).iter()
            .find(|&&(ladder_code, _)| ladder_code == code)
            .map(|&(_, ceiling)| ceiling)
    }

    pub fn is_fixed(self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl crate::cmd::Argument for Range {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

pub(crate) const VOLTAGE_LADDER: &[(u32, f64)] = &[
    (2,     0.2),
    (5,     0.5),
    (20,    2.0),
    (50,    5.0),
    (200,   20.0),
    (400,   40.0),
    (1000,  100.0),
    (2000,  200.0),
    (5000,  500.0),
    (15000, 1500.0),
    (30000, 3000.0),
];

pub(crate) const CURRENT_LADDER: &[(u32, f64)] = &[
    (8,  1e-12),
    (9,  1e-11),
    (10, 1e-10),
    (11, 1e-9),
    (12, 1e-8),
    (13, 1e-7),
    (14, 1e-6),
    (15, 1e-5),
    (16, 1e-4),
    (17, 1e-3),
    (18, 1e-2),
    (19, 1e-1),
    (20, 1.0),
    (21, 2.0),
    (22, 20.0),
    (23, 40.0),
];

pub(crate) fn ladder(quantity: Quantity) -> &'static [(u32, f64)] {
    match quantity {
        Quantity::Voltage => VOLTAGE_LADDER,
        Quantity::Current => CURRENT_LADDER,
    }
}

pub(crate) fn smallest_range(quantity: Quantity, values: &[f64], fixed: bool,
                             allowed: &[Range]) -> Range {
    if values.iter().any(|value| !value.is_finite()) {
        return Range::Auto
    }
    let magnitude = values.iter().fold(0.0f64, |max, value| max.max(value.abs()));
    for &(code, ceiling) in ladder(quantity) {
        if ceiling < magnitude { continue }
        let candidate = if fixed { Range::Fixed(code) } else { Range::Limited(code) };
        if allowed.contains(&candidate) {
            return candidate
        }
    }
    Range::Auto
}

/// Smallest voltage range in `allowed` whose ceiling covers the largest magnitude in `values`.
///
/// Falls back to full auto ranging when nothing in `allowed` covers the value, or when a value
/// is not finite.
pub fn smallest_voltage_range(values: &[f64], fixed: bool, allowed: &[Range]) -> Range {
    smallest_range(Quantity::Voltage, values, fixed, allowed)
}

/// Current counterpart of [`smallest_voltage_range`].
pub fn smallest_current_range(values: &[f64], fixed: bool, allowed: &[Range]) -> Range {
    smallest_range(Quantity::Current, values, fixed, allowed)
}

#[cfg(test)]
mod test {
    use super::*;

    fn limited(ladder: &[(u32, f64)]) -> Vec<Range> {
        std::iter::once(Range::Auto)
            .chain(ladder.iter().map(|&(code, _)| Range::Limited(code)))
            .collect()
    }

    #[test]
    fn test_codes() {
        assert_eq!(Range::from_code(0), Range::Auto);
        assert_eq!(Range::from_code(14), Range::Limited(14));
        assert_eq!(Range::from_code(-200), Range::Fixed(200));
        assert_eq!(Range::Fixed(200).code(), -200);
        assert_eq!(Range::Limited(50).ceiling(Quantity::Voltage), Some(5.0));
        assert_eq!(Range::Limited(17).ceiling(Quantity::Current), Some(1e-3));
        assert_eq!(Range::Auto.ceiling(Quantity::Current), None);
    }

    #[test]
    fn test_microamp_limited() {
        let allowed = limited(CURRENT_LADDER);
        assert_eq!(smallest_current_range(&[0.5e-6], false, &allowed), Range::Limited(14));
    }

    #[test]
    fn test_voltage_code_headroom() {
        let allowed = limited(VOLTAGE_LADDER);
        for &value in &[0.0, 0.1, 0.2, 0.21, 1.0, 4.9, 5.0, 33.0, 99.0, 150.0, 2999.0] {
            let range = smallest_voltage_range(&[value], false, &allowed);
            let code = range.code() as f64;
            assert!(code >= 10.0 * value, "{} -> {:?}", value, range);
            // no smaller allowed range also covers the value
            for &smaller in allowed.iter().filter(|r| r.code() > 0 && r.code() < range.code()) {
                assert!((smaller.code() as f64) < 10.0 * value, "{} -> {:?}", value, range);
            }
        }
    }

    #[test]
    fn test_restricted_allowed_set() {
        let allowed = [Range::Auto, Range::Limited(5), Range::Limited(50), Range::Limited(200)];
        assert_eq!(smallest_voltage_range(&[0.3], false, &allowed), Range::Limited(5));
        assert_eq!(smallest_voltage_range(&[0.6], false, &allowed), Range::Limited(50));
        assert_eq!(smallest_voltage_range(&[21.0], false, &allowed), Range::Auto);
    }

    #[test]
    fn test_two_values() {
        let allowed = limited(VOLTAGE_LADDER);
        assert_eq!(smallest_voltage_range(&[-3.0, 1.0], false, &allowed), Range::Limited(50));
        for &value in &[0.0, 0.7, 12.0, 1e4] {
            assert_eq!(smallest_voltage_range(&[value, value], false, &allowed),
                       smallest_voltage_range(&[value], false, &allowed));
        }
    }

    #[test]
    fn test_out_of_ladder() {
        let allowed = limited(CURRENT_LADDER);
        assert_eq!(smallest_current_range(&[100.0], false, &allowed), Range::Auto);
        assert_eq!(smallest_current_range(&[f64::NAN], false, &allowed), Range::Auto);
        assert_eq!(smallest_current_range(&[f64::INFINITY], false, &allowed), Range::Auto);
    }

    #[test]
    fn test_zero_is_smallest() {
        let allowed = limited(CURRENT_LADDER);
        assert_eq!(smallest_current_range(&[0.0], false, &allowed), Range::Limited(8));
        assert_eq!(smallest_current_range(&[], false, &allowed), Range::Limited(8));
    }

    #[test]
    fn test_fixed() {
        let allowed = [Range::Auto, Range::Limited(14), Range::Fixed(14), Range::Fixed(15)];
        assert_eq!(smallest_current_range(&[2e-6], true, &allowed), Range::Fixed(15));
        assert_eq!(smallest_current_range(&[2e-6], false, &allowed), Range::Auto);
        assert_eq!(smallest_current_range(&[1e-3], true, &allowed), Range::Auto);
    }
}
