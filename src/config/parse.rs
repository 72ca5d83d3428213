//! Parsers for human-readable configuration values.
//!
//! Durations use Go's syntax (`"15m"`, `"1h30m"`, `"250ms"`, `"0"`) so
//! existing deployment files keep working. Sizes accept an optional unit
//! suffix, case-insensitive, with binary multiples: `B`, `K`/`KB`, `M`/`MB`,
//! `G`/`GB`, `T`/`TB`. A bare number is bytes and fractions are allowed
//! (`"1.5G"`).

use std::time::Duration;

/// Parses a Go-style duration string.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ant_watcher::config::parse_duration;
///
/// assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
/// assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
/// assert!(parse_duration("15").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration is empty".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err(format!("negative duration: {input}"));
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration: {input}"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration number in {input}"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {input}")),
            other => return Err(format!("unknown unit {other:?} in duration {input}")),
        };
        rest = &rest[unit_len..];
        total_nanos += value * nanos_per_unit;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(format!("duration out of range: {input}"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Parses a human-readable byte size into bytes.
///
/// # Examples
///
/// ```
/// use ant_watcher::config::parse_size;
///
/// assert_eq!(parse_size("512MB"), Ok(512 * 1024 * 1024));
/// assert_eq!(parse_size("100g"), Ok(100 * 1024 * 1024 * 1024));
/// assert_eq!(parse_size("0"), Ok(0));
/// ```
pub fn parse_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("size is empty".to_string());
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = (s[..split].trim(), s[split..].trim());

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size number in {input}"))?;

    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1 << 40,
        other => return Err(format!("unrecognized size unit: {other}")),
    };

    Ok((value * multiplier as f64) as u64)
}

/// Parses a boolean flag the way the deployment files spell them.
pub fn parse_bool(input: &str) -> Result<bool, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Ok(true),
        "false" | "f" | "0" | "no" | "" => Ok(false),
        other => Err(format!("invalid boolean: {other}")),
    }
}
