//! Delay gauge reconstruction.
//!
//! Destinations report the delay of the last event they sampled, and how many
//! seconds ago that sample was taken. A delay sample is published with the
//! time it was taken as its timestamp, and only when it was taken after the
//! previous poll, so the same point is never reported twice.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::family::{Labels, MetricFamily, MetricKind};

/// Sampled event delay per destination.
pub const DELAY_FAMILY: &str = "syslogng_output_event_delay_sample_seconds";

/// Age in seconds of the matching [`DELAY_FAMILY`] sample.
pub const DELAY_AGE_FAMILY: &str = "syslogng_output_event_delay_sample_age_seconds";

/// Rewrite the delay family in `families` against its age family.
///
/// The age family is always removed. The delay family keeps only the samples
/// with a matching age whose origin is strictly after `previous_poll`, and is
/// removed when none do.
pub fn reconcile_delay(
    families: &mut Vec<MetricFamily>,
    previous_poll: Option<SystemTime>,
    now: SystemTime,
) {
    let age = take_family(families, DELAY_AGE_FAMILY);
    let Some(idx) = families.iter().position(|f| f.name == DELAY_FAMILY) else {
        return;
    };

    let ages: HashMap<&Labels, f64> = age
        .iter()
        .flat_map(|f| f.samples.iter())
        .map(|s| (&s.labels, s.value))
        .collect();

    let delay = &mut families[idx];
    let total = delay.samples.len();
    let samples = std::mem::take(&mut delay.samples);

    for mut sample in samples {
        let Some(origin) = ages.get(&sample.labels).and_then(|&age| origin_of(now, age)) else {
            continue;
        };
        if previous_poll.map_or(true, |prev| origin > prev) {
            sample.timestamp_ms = Some(unix_millis(origin));
            delay.samples.push(sample);
        }
    }

    tracing::debug!(
        "Kept {} of {} delay samples since {:?}",
        delay.samples.len(),
        total,
        previous_poll
    );

    delay.kind = MetricKind::Gauge;
    if delay.samples.is_empty() {
        families.remove(idx);
    }
}

fn take_family(families: &mut Vec<MetricFamily>, name: &str) -> Option<MetricFamily> {
    let idx = families.iter().position(|f| f.name == name)?;
    Some(families.remove(idx))
}

/// When a sample `age` seconds old was taken. Fractions of a second are
/// truncated.
fn origin_of(now: SystemTime, age: f64) -> Option<SystemTime> {
    if !age.is_finite() {
        return None;
    }
    let offset = Duration::from_secs(age.trunc().abs() as u64);
    if age < 0.0 {
        now.checked_add(offset)
    } else {
        now.checked_sub(offset)
    }
}

fn unix_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
