// src/config/duration.rs
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("negative duration {0:?} is not allowed")]
    Negative(String),

    #[error("duration {0:?} is out of range")]
    Overflow(String),
}

const GROUP: &str = r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|μs|ms|s|m|h)";

fn group_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(GROUP).expect("duration group pattern is valid"))
}

fn full_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!("^(?:{GROUP})+$")).expect("duration pattern is valid")
    })
}

fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "ns" => 1.0,
        "us" | "µs" | "μs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        _ => 3600e9,
    }
}

/// Parse a duration string such as `"5s"`, `"250ms"` or `"1h2m3.5s"`.
///
/// Accepts the same grammar as Go's `time.ParseDuration`, except that
/// negative values are rejected because a `Duration` cannot hold them.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.starts_with('-') {
        return Err(DurationError::Negative(input.to_string()));
    }
    let s = trimmed.strip_prefix('+').unwrap_or(trimmed);

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if !full_pattern().is_match(s) {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut nanos = 0f64;
    for caps in group_pattern().captures_iter(s) {
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| DurationError::Invalid(input.to_string()))?;
        nanos += value * unit_nanos(&caps[2]);
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(DurationError::Overflow(input.to_string()));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}
