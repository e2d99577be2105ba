/// Utility helpers shared by the source and collector modules.
///
/// This module contains:
/// - Snowflake ID parsing helpers
/// - Retry backoff computation
///
/// IMPORTANT:
/// - No Discord request logic should live here.
/// - Everything except the jitter must stay deterministic.
///
use std::time::Duration;

use rand::random_range;
use serde::{Deserialize, Deserializer, de};

/// Upper bound for a single backoff step.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Deserializes a snowflake ID.
///
/// Discord sends IDs as decimal strings to keep them safe in
/// JavaScript clients; plain numbers are accepted too.
///
/// Examples:
/// - "468638089359785984" -> 468638089359785984
/// - 42                   -> 42
pub fn deserialize_snowflake<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s.parse().map_err(de::Error::custom),
        Raw::Number(n) => Ok(n),
    }
}

/// Deserializes epoch seconds written as an integer or as a float
/// with zero fraction (`1699974800.0`, as older archives have it).
pub fn deserialize_epoch_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
        Raw::Float(f) => Err(de::Error::custom(format!("{f} is not a whole number of seconds"))),
    }
}

/// Delay before retry number `attempt` (0-based).
///
/// Doubles from `base` on every attempt, capped at one minute,
/// plus up to 25% random jitter so that throttled fetchers do
/// not retry in lockstep. `floor` is a server-provided minimum
/// (e.g. a rate-limit `retry_after`).
pub fn backoff_delay(base: Duration, attempt: u32, floor: Option<Duration>) -> Duration {
    let exp = base
        .checked_mul(1u32 << attempt.min(16))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF);

    let jitter_ms = (exp.as_millis() as u64) / 4;
    let jitter = if jitter_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(random_range(0..=jitter_ms))
    };

    (exp + jitter).max(floor.unwrap_or(Duration::ZERO))
}
