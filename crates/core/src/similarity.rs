//! Bit-level distance between fingerprints.

use std::fmt;
use std::str::FromStr;

use crate::error::{FuzzError, Result};

pub const DEFAULT_ERROR_RATE: f64 = 0.1;

/// Number of differing bits, or `None` when the fingerprints have different
/// lengths and therefore come from different schemes.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum())
}

/// Fraction of differing bits in `[0, 1]`. Empty fingerprints carry no
/// information and are not comparable.
pub fn similarity_gap(a: &[u8], b: &[u8]) -> Option<f64> {
    if a.is_empty() {
        return None;
    }
    let distance = hamming_distance(a, b)?;
    Some(distance as f64 / (a.len() * 8) as f64)
}

pub fn is_similar(a: &[u8], b: &[u8], error_rate: f64) -> bool {
    similarity_gap(a, b).is_some_and(|gap| gap <= error_rate)
}

/// Tolerated fraction of differing bits, validated to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ErrorRate(f64);

impl ErrorRate {
    pub fn new(rate: f64) -> Result<Self> {
        if rate.is_finite() && (0.0..=1.0).contains(&rate) {
            Ok(Self(rate))
        } else {
            Err(FuzzError::InvalidErrorRate(rate))
        }
    }

    pub fn from_percent(percent: f64) -> Result<Self> {
        Self::new(percent / 100.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for ErrorRate {
    fn default() -> Self {
        Self(DEFAULT_ERROR_RATE)
    }
}

impl fmt::Display for ErrorRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ErrorRate {
    type Err = FuzzError;

    /// Accepts a fraction (`0.1`) or a percentage (`10%`).
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let parse = |raw: &str| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| FuzzError::UnparsableErrorRate(s.to_string()))
        };
        match trimmed.strip_suffix('%') {
            Some(percent) => Self::from_percent(parse(percent)?),
            None => Self::new(parse(trimmed)?),
        }
    }
}
