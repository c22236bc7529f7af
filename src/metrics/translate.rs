//! `STATS PROMETHEUS` response translation.
//!
//! Depending on the daemon version the response is either a legacy stats dump
//! or exposition text. Both end up as the same canonical families.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::delay::reconcile_delay;
use super::exposition::{parse_exposition, repair_escaping};
use super::family::{MetricFamily, MetricKind, MetricSet};
use super::legacy::LegacyMapping;
use crate::error::MetricError;
use crate::stats::{parse_stats, OrphanPolicy, STATS_HEADER};

/// Namespace prefixed to the families built from legacy stats.
pub const DEFAULT_NAMESPACE: &str = "syslogng";

const EVENTS_TOTAL_SUFFIX: &str = "_events_total";

/// Translation settings.
///
/// # Example
///
/// ```
/// use syslogng_ctl::metrics::TranslatorConfig;
/// use syslogng_ctl::stats::OrphanPolicy;
///
/// let config = TranslatorConfig::default()
///     .namespace("axosyslog")
///     .orphans(OrphanPolicy::Keep);
/// assert_eq!(config.namespace, "axosyslog");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Prefix of legacy family names.
    pub namespace: String,
    /// Handling of legacy rows from orphaned sources.
    pub orphans: OrphanPolicy,
    /// Legacy row to family mapping.
    pub mapping: LegacyMapping,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            orphans: OrphanPolicy::default(),
            mapping: LegacyMapping::default(),
        }
    }
}

impl TranslatorConfig {
    /// Set the legacy family namespace.
    ///
    /// Default: `syslogng`
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the orphaned row policy.
    ///
    /// Default: [`OrphanPolicy::Drop`]
    pub fn orphans(mut self, policy: OrphanPolicy) -> Self {
        self.orphans = policy;
        self
    }

    /// Replace the legacy mapping table.
    pub fn mapping(mut self, mapping: LegacyMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Translate a `STATS PROMETHEUS` response.
    ///
    /// `previous_poll` is when the previous response was fetched, `now` when
    /// this one was. Content problems land in [`MetricSet::errors`].
    pub fn translate(&self, raw: &str, previous_poll: Option<SystemTime>, now: SystemTime) -> MetricSet {
        if raw.starts_with(STATS_HEADER) {
            tracing::debug!("Translating legacy stats response");
            return self.translate_legacy(raw);
        }

        let mut set = parse_exposition(&repair_escaping(raw));
        retype_untyped(&mut set.families);
        reconcile_delay(&mut set.families, previous_poll, now);
        set
    }

    fn translate_legacy(&self, raw: &str) -> MetricSet {
        let parsed = parse_stats(raw);
        let mut stats = parsed.stats;
        self.orphans.apply(&mut stats);

        let mut set = self.mapping.translate(&stats, &self.namespace);
        let mut errors: Vec<MetricError> = parsed.errors.into_iter().map(MetricError::from).collect();
        errors.append(&mut set.errors);
        set.errors = errors;
        set
    }
}

/// Translate a `STATS PROMETHEUS` response with the default settings.
pub fn to_metric_families(raw: &str, previous_poll: Option<SystemTime>, now: SystemTime) -> MetricSet {
    TranslatorConfig::default().translate(raw, previous_poll, now)
}

/// Give every untyped family a concrete type: `*_events_total` families are
/// counters, the rest gauges.
fn retype_untyped(families: &mut [MetricFamily]) {
    for family in families.iter_mut().filter(|f| f.kind == MetricKind::Untyped) {
        family.kind = if family.name.ends_with(EVENTS_TOTAL_SUFFIX) {
            MetricKind::Counter
        } else {
            MetricKind::Gauge
        };
    }
}
