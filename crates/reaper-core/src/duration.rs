//! Duration string parsing.
//!
//! Lifetime annotations and the node threshold use Go's duration syntax: a
//! sequence of decimal numbers, each with an optional fraction and a unit
//! suffix, such as `"300ms"`, `"1.5h"` or `"2h45m"`. Valid units are `ns`,
//! `us` (or `µs`), `ms`, `s`, `m` and `h`.
//!
//! A leading `-` yields a negative [`SignedDuration`]. Every age is past a
//! negative lifetime or threshold.

use std::fmt;
use std::time::Duration;

use crate::error::DurationError;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;

/// Largest representable duration, matching a signed 64-bit nanosecond count.
const MAX_NANOS: u64 = i64::MAX as u64;

/// Fraction digits beyond this are consumed but ignored.
const MAX_FRACTION_DIGITS: usize = 18;

/// A duration that may be negative.
///
/// Negative zero does not exist: `"-0s"` parses to [`SignedDuration::ZERO`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignedDuration {
    negative: bool,
    magnitude: Duration,
}

impl SignedDuration {
    /// The zero duration.
    pub const ZERO: Self = Self {
        negative: false,
        magnitude: Duration::ZERO,
    };

    /// A negative duration of the given magnitude.
    #[must_use]
    pub const fn negative(magnitude: Duration) -> Self {
        Self {
            negative: !magnitude.is_zero(),
            magnitude,
        }
    }

    /// Returns true for zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    /// Returns true below zero.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.negative
    }

    /// The absolute value.
    #[must_use]
    pub const fn magnitude(&self) -> Duration {
        self.magnitude
    }

    /// Returns true if `age` is strictly longer than this duration.
    #[must_use]
    pub fn is_exceeded_by(&self, age: Duration) -> bool {
        self.negative || age > self.magnitude
    }

    /// Returns true if `age` is at least this duration.
    #[must_use]
    pub fn is_reached_by(&self, age: Duration) -> bool {
        self.negative || age >= self.magnitude
    }
}

impl From<Duration> for SignedDuration {
    fn from(magnitude: Duration) -> Self {
        Self {
            negative: false,
            magnitude,
        }
    }
}

impl fmt::Display for SignedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        write!(f, "{:?}", self.magnitude)
    }
}

/// Parse a Go-style duration string.
///
/// # Errors
///
/// Returns a [`DurationError`] if the string is empty, malformed, uses an
/// unknown unit, or overflows.
///
/// # Example
///
/// ```
/// use reaper_core::{parse_duration, SignedDuration};
/// use std::time::Duration;
///
/// assert_eq!(
///     parse_duration("72h").unwrap(),
///     SignedDuration::from(Duration::from_secs(72 * 3600))
/// );
/// assert!(parse_duration("-1.5s").unwrap().is_negative());
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<SignedDuration, DurationError> {
    if input.is_empty() {
        return Err(DurationError::Empty);
    }

    let (negative, mut rest) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Ok(SignedDuration::ZERO);
    }
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut total: u64 = 0;
    while !rest.is_empty() {
        let (segment, remaining) = parse_segment(rest, input)?;
        total = total
            .checked_add(segment)
            .filter(|n| *n <= MAX_NANOS)
            .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
        rest = remaining;
    }

    let magnitude = Duration::from_nanos(total);
    if negative {
        Ok(SignedDuration::negative(magnitude))
    } else {
        Ok(magnitude.into())
    }
}

/// Parse one `<number>[.<fraction>]<unit>` segment, returning its nanoseconds
/// and the unconsumed remainder.
fn parse_segment<'a>(s: &'a str, input: &str) -> Result<(u64, &'a str), DurationError> {
    let bytes = s.as_bytes();
    if !(bytes[0] == b'.' || bytes[0].is_ascii_digit()) {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let int_len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    let whole: u64 = if int_len == 0 {
        0
    } else {
        s[..int_len]
            .parse()
            .map_err(|_| DurationError::Overflow(input.to_string()))?
    };
    let mut pos = int_len;

    let mut fraction: u64 = 0;
    let mut scale: u64 = 1;
    let mut frac_len = 0;
    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        frac_len = bytes[pos..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        for digit in bytes[pos..pos + frac_len].iter().take(MAX_FRACTION_DIGITS) {
            fraction = fraction * 10 + u64::from(digit - b'0');
            scale *= 10;
        }
        pos += frac_len;
    }

    if int_len == 0 && frac_len == 0 {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let unit_len = bytes[pos..]
        .iter()
        .take_while(|b| **b != b'.' && !b.is_ascii_digit())
        .count();
    if unit_len == 0 {
        return Err(DurationError::MissingUnit(input.to_string()));
    }
    let unit = &s[pos..pos + unit_len];
    let per_unit = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
        unit: unit.to_string(),
        input: input.to_string(),
    })?;

    let whole_nanos = whole
        .checked_mul(per_unit)
        .filter(|n| *n <= MAX_NANOS)
        .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
    let fraction_nanos = u128::from(fraction) * u128::from(per_unit) / u128::from(scale);
    let fraction_nanos =
        u64::try_from(fraction_nanos).map_err(|_| DurationError::Overflow(input.to_string()))?;
    let nanos = whole_nanos
        .checked_add(fraction_nanos)
        .ok_or_else(|| DurationError::Overflow(input.to_string()))?;

    Ok((nanos, &s[pos + unit_len..]))
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(NANOS_PER_MINUTE),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}
