//! Human-readable durations for config values like poll intervals and TTLs ("5s", "1h", "250ms").

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

const UNITS: &[(&str, u64)] = &[
    ("ms", 1),
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
];

/// Parse a duration string like "10s", "1h" or "250ms".
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`. Case-insensitive, surrounding whitespace
/// is ignored.
///
/// # Examples
///
/// ```
/// use pricepulse::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
/// assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    // "ms" has to be checked before "m" and "s".
    let (num, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, factor)| s.strip_suffix(suffix).map(|num| (num, *factor)))
        .context("Duration must end with ms, s, m, h, or d")?;

    let num: u64 = num
        .parse()
        .with_context(|| format!("Invalid number in duration {s:?}"))?;
    let millis = num
        .checked_mul(millis_per_unit)
        .context("Duration is too large")?;

    Ok(Duration::from_millis(millis))
}

/// Format a duration using the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }

    for (suffix, factor) in UNITS.iter().skip(1).chain(UNITS.iter().take(1)) {
        let factor = u128::from(*factor);
        if millis % factor == 0 {
            return format!("{}{suffix}", millis / factor);
        }
    }
    format!("{millis}ms")
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Serde serializer counterpart of [`deserialize_duration`].
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}
