//! Offline reports over the archive.
//!
//! These only consume `NormalizedRecord`s read back from the archive
//! store; chart rendering is left to whatever displays the numbers.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Timelike};

use crate::schema::NormalizedRecord;

/// Length of one activity window ("a month"), in seconds.
pub const MONTH_SECS: i64 = 2_628_000;

/// Columns of the activity heatmap (months per year).
pub const HEATMAP_COLS: usize = 12;

/// Offset at which archive times are read for hour-of-day charts.
const HOUR_CHART_OFFSET_SECS: i32 = -8 * 3600;

/// Message counts per consecutive `MONTH_SECS` window, starting at
/// the earliest record. Windows with no messages count as zero.
pub fn monthly_activity(records: &[NormalizedRecord]) -> Vec<u64> {
    let Some(start) = records.iter().map(|r| r.time).min() else {
        return Vec::new();
    };

    let mut counts: Vec<u64> = Vec::new();
    for record in records {
        let idx = ((record.time - start) / MONTH_SECS) as usize;
        if idx >= counts.len() {
            counts.resize(idx + 1, 0);
        }
        counts[idx] += 1;
    }
    counts
}

/// Reshapes monthly counts into rows of `HEATMAP_COLS`, padding the
/// last row with zeros.
pub fn heatmap_rows(counts: &[u64]) -> Vec<Vec<u64>> {
    counts
        .chunks(HEATMAP_COLS)
        .map(|chunk| {
            let mut row = chunk.to_vec();
            row.resize(HEATMAP_COLS, 0);
            row
        })
        .collect()
}

/// Messages per hour of day (index 0..24).
pub fn hourly_histogram(records: &[NormalizedRecord]) -> [u64; 24] {
    let mut hours = [0u64; 24];
    let Some(offset) = FixedOffset::east_opt(HOUR_CHART_OFFSET_SECS) else {
        return hours;
    };

    for record in records {
        if let Some(dt) = DateTime::from_timestamp(record.time, 0) {
            hours[dt.with_timezone(&offset).hour() as usize] += 1;
        }
    }
    hours
}

/// Messages per author, most active first; ties by name.
pub fn author_totals(records: &[NormalizedRecord]) -> Vec<(String, u64)> {
    let mut totals: HashMap<&str, u64> = HashMap::new();
    for record in records {
        *totals.entry(record.author.as_str()).or_default() += 1;
    }

    let mut sorted: Vec<(String, u64)> = totals
        .into_iter()
        .map(|(author, n)| (author.to_string(), n))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}
