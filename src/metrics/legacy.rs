//! Mapping of legacy stats rows onto metric families.
//!
//! The mapping is a list of [`MappingRule`]s tried in order; the first rule
//! whose filters accept a row decides the family, type and labels of its
//! sample. Rows no rule accepts are ignored.
//!
//! [`LegacyMapping::default`] reproduces the names the daemon itself uses for
//! `STATS PROMETHEUS`:
//!
//! | Row                                          | Family                        |
//! |----------------------------------------------|-------------------------------|
//! | `global` / `scratch_buffers_{count,bytes}`   | `<ns>_<id>` gauge             |
//! | `global` / `msg_allocated_bytes`             | `<ns>_events_allocated_bytes` |
//! | `filter`                                     | `<ns>_filtered_events_total`  |
//! | `src.*`, non-empty id, `processed`           | `<ns>_input_events_total`     |
//! | `dst.*`, `dropped` / `queued` / `written`    | `<ns>_output_events_total`    |
//! | `parser`                                     | `<ns>_parsed_events_total`    |
//! | `tag`                                        | `<ns>_tagged_events_total`    |

use serde::{Deserialize, Serialize};

use super::family::{FamilyBuilder, Labels, MetricKind, MetricSet};
use crate::stats::Stat;

/// How a rule matches the `SourceName` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    Exact(String),
    Prefix(String),
}

impl NameMatch {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatch::Exact(n) => name == n,
            NameMatch::Prefix(p) => name.starts_with(p.as_str()),
        }
    }
}

/// Filter on a free-form column (`SourceId` or `Type`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFilter {
    #[default]
    Any,
    NonEmpty,
    OneOf(Vec<String>),
}

impl ColumnFilter {
    fn one_of(values: &[&str]) -> Self {
        ColumnFilter::OneOf(values.iter().map(|v| v.to_string()).collect())
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            ColumnFilter::Any => true,
            ColumnFilter::NonEmpty => !value.is_empty(),
            ColumnFilter::OneOf(values) => values.iter().any(|v| v == value),
        }
    }
}

/// Name of the family a rule emits into, without the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyName {
    Fixed(String),
    /// Use the row's `SourceId`.
    SourceId,
}

/// Labels attached to an emitted sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStyle {
    Unlabeled,
    /// `id` from `SourceId`, `result` from `Type`, plus `driver_instance`
    /// from a non-empty `SourceInstance` when enabled.
    IdResult { driver_instance: bool },
}

/// One entry of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub source_name: NameMatch,
    #[serde(default)]
    pub source_id: ColumnFilter,
    #[serde(default)]
    pub stat_type: ColumnFilter,
    pub family: FamilyName,
    pub kind: MetricKind,
    pub labels: LabelStyle,
    /// `(from, to)` replacements applied to the `result` label.
    #[serde(default)]
    pub result_renames: Vec<(String, String)>,
}

impl MappingRule {
    fn new(source_name: NameMatch, family: FamilyName, kind: MetricKind, labels: LabelStyle) -> Self {
        Self {
            source_name,
            source_id: ColumnFilter::Any,
            stat_type: ColumnFilter::Any,
            family,
            kind,
            labels,
            result_renames: Vec::new(),
        }
    }

    fn source_id(mut self, filter: ColumnFilter) -> Self {
        self.source_id = filter;
        self
    }

    fn stat_type(mut self, filter: ColumnFilter) -> Self {
        self.stat_type = filter;
        self
    }

    fn rename_result(mut self, from: &str, to: &str) -> Self {
        self.result_renames.push((from.to_string(), to.to_string()));
        self
    }

    /// Whether this rule accepts `stat`.
    pub fn matches(&self, stat: &Stat) -> bool {
        self.source_name.matches(&stat.source_name)
            && self.source_id.matches(&stat.source_id)
            && self.stat_type.matches(&stat.kind)
    }

    fn family_name(&self, namespace: &str, stat: &Stat) -> String {
        let suffix = match &self.family {
            FamilyName::Fixed(name) => name.as_str(),
            FamilyName::SourceId => stat.source_id.as_str(),
        };
        if namespace.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", namespace, suffix)
        }
    }

    fn labels_for(&self, stat: &Stat) -> Labels {
        let mut labels = Labels::new();
        if let LabelStyle::IdResult { driver_instance } = self.labels {
            let result = self
                .result_renames
                .iter()
                .find(|(from, _)| *from == stat.kind)
                .map_or(stat.kind.as_str(), |(_, to)| to.as_str());

            labels.insert("id".to_string(), stat.source_id.clone());
            labels.insert("result".to_string(), result.to_string());
            if driver_instance && !stat.source_instance.is_empty() {
                labels.insert("driver_instance".to_string(), stat.source_instance.clone());
            }
        }
        labels
    }
}

/// Ordered mapping table from legacy rows to metric families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegacyMapping {
    pub rules: Vec<MappingRule>,
}

impl Default for LegacyMapping {
    fn default() -> Self {
        use LabelStyle::IdResult;
        use MetricKind::{Counter, Gauge};

        let exact = |name: &str| NameMatch::Exact(name.to_string());
        let prefix = |name: &str| NameMatch::Prefix(name.to_string());
        let fixed = |name: &str| FamilyName::Fixed(name.to_string());
        let id_result = IdResult { driver_instance: false };
        let with_instance = IdResult { driver_instance: true };

        Self {
            rules: vec![
                MappingRule::new(exact("global"), FamilyName::SourceId, Gauge, LabelStyle::Unlabeled)
                    .source_id(ColumnFilter::one_of(&["scratch_buffers_count", "scratch_buffers_bytes"])),
                MappingRule::new(exact("global"), fixed("events_allocated_bytes"), Gauge, LabelStyle::Unlabeled)
                    .source_id(ColumnFilter::one_of(&["msg_allocated_bytes"])),
                MappingRule::new(exact("filter"), fixed("filtered_events_total"), Counter, id_result.clone()),
                MappingRule::new(prefix("src."), fixed("input_events_total"), Counter, with_instance.clone())
                    .source_id(ColumnFilter::NonEmpty)
                    .stat_type(ColumnFilter::one_of(&["processed"])),
                MappingRule::new(prefix("dst."), fixed("output_events_total"), Counter, with_instance)
                    .stat_type(ColumnFilter::one_of(&["dropped", "queued", "written"]))
                    .rename_result("written", "delivered"),
                MappingRule::new(exact("parser"), fixed("parsed_events_total"), Counter, id_result.clone()),
                MappingRule::new(exact("tag"), fixed("tagged_events_total"), Counter, id_result),
            ],
        }
    }
}

impl LegacyMapping {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    /// First rule accepting `stat`.
    pub fn rule_for(&self, stat: &Stat) -> Option<&MappingRule> {
        self.rules.iter().find(|rule| rule.matches(stat))
    }

    /// Translate rows into families named under `namespace`.
    ///
    /// A row landing in an existing family of another type is reported and
    /// skipped; the other rows still translate.
    pub fn translate(&self, stats: &[Stat], namespace: &str) -> MetricSet {
        let mut builder = FamilyBuilder::new();
        let mut set = MetricSet::default();

        for stat in stats {
            let Some(rule) = self.rule_for(stat) else {
                continue;
            };
            let name = rule.family_name(namespace, stat);
            if let Err(e) = builder.push(&name, rule.kind, rule.labels_for(stat), stat.number as f64) {
                tracing::warn!("Dropping legacy stat {}/{}: {}", stat.source_name, stat.source_id, e);
                set.errors.push(e);
            }
        }

        set.families = builder.build();
        set
    }
}
