//! Canonical metric model.
//!
//! A [`MetricFamily`] is a named, typed group of samples. Families are kept in
//! first-seen order so that output is deterministic.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MetricError;

/// Label set of a sample, unique by label name.
pub type Labels = BTreeMap<String, String>;

/// Type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    /// Only seen between parsing exposition text and retyping it.
    Untyped,
}

impl MetricKind {
    /// Name used in `# TYPE` lines.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Untyped => "untyped",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled value of a family.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: Option<i64>,
}

impl Sample {
    pub fn new(labels: Labels, value: f64) -> Self {
        Self {
            labels,
            value,
            timestamp_ms: None,
        }
    }

    /// Look up a label value.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// A named, typed group of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    /// Empty when the source carried no help text.
    pub help: String,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            help: String::new(),
            kind,
            samples: Vec::new(),
        }
    }

    /// Find the sample carrying exactly `labels`.
    pub fn sample(&self, labels: &Labels) -> Option<&Sample> {
        self.samples.iter().find(|s| &s.labels == labels)
    }
}

/// Families produced from one stats response, plus the problems met on the way.
#[derive(Debug, Default)]
pub struct MetricSet {
    pub families: Vec<MetricFamily>,
    pub errors: Vec<MetricError>,
}

impl MetricSet {
    /// Look up a family by name.
    pub fn get(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// True if nothing went wrong while producing the families.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Encode the families as exposition text.
    pub fn render_text(&self) -> Result<String, MetricError> {
        super::exposition::render_text(&self.families)
    }
}

/// Accumulates families by name, keeping first-seen order.
#[derive(Debug, Default)]
pub struct FamilyBuilder {
    families: Vec<MetricFamily>,
    index: HashMap<String, usize>,
}

impl FamilyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the family `name`, creating it untyped if absent.
    pub fn entry(&mut self, name: &str) -> &mut MetricFamily {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                let idx = self.families.len();
                self.families.push(MetricFamily::new(name, MetricKind::Untyped));
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        &mut self.families[idx]
    }

    /// Get the family `name`, which must have type `kind` if it exists.
    pub fn typed(&mut self, name: &str, kind: MetricKind) -> Result<&mut MetricFamily, MetricError> {
        let fresh = !self.index.contains_key(name);
        let family = self.entry(name);
        if fresh {
            family.kind = kind;
        } else if family.kind != kind {
            return Err(MetricError::TypeMismatch {
                family: name.to_string(),
                expected: kind,
                actual: family.kind,
            });
        }
        Ok(family)
    }

    /// Append a sample to family `name` of type `kind`.
    pub fn push(
        &mut self,
        name: &str,
        kind: MetricKind,
        labels: Labels,
        value: f64,
    ) -> Result<(), MetricError> {
        self.typed(name, kind)?.samples.push(Sample::new(labels, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetricFamily> {
        self.index.get(name).map(|&idx| &self.families[idx])
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn build(self) -> Vec<MetricFamily> {
        self.families
    }
}

/// Build a label set from pairs.
pub fn labels<K, V, I>(pairs: I) -> Labels
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_order() {
        let mut builder = FamilyBuilder::new();
        builder.push("b", MetricKind::Gauge, Labels::new(), 1.0).unwrap();
        builder.push("a", MetricKind::Counter, Labels::new(), 2.0).unwrap();
        builder.push("b", MetricKind::Gauge, labels([("id", "x")]), 3.0).unwrap();

        let families = builder.build();
        let names: Vec<_> = families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(families[0].samples.len(), 2);
    }

    #[test]
    fn test_type_mismatch_keeps_family() {
        let mut builder = FamilyBuilder::new();
        builder.push("x", MetricKind::Counter, Labels::new(), 1.0).unwrap();

        let err = builder
            .push("x", MetricKind::Gauge, Labels::new(), 2.0)
            .unwrap_err();

        match err {
            MetricError::TypeMismatch { family, expected, actual } => {
                assert_eq!(family, "x");
                assert_eq!(expected, MetricKind::Gauge);
                assert_eq!(actual, MetricKind::Counter);
            }
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
        let family = builder.get("x").unwrap();
        assert_eq!(family.kind, MetricKind::Counter);
        assert_eq!(family.samples.len(), 1);
    }

    #[test]
    fn test_sample_lookup_ignores_label_order() {
        let mut family = MetricFamily::new("f", MetricKind::Gauge);
        family
            .samples
            .push(Sample::new(labels([("b", "2"), ("a", "1")]), 7.0));

        let sample = family.sample(&labels([("a", "1"), ("b", "2")])).unwrap();
        assert_eq!(sample.value, 7.0);
        assert_eq!(sample.label("b"), Some("2"));
        assert!(family.sample(&labels([("a", "1")])).is_none());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Untyped.as_str(), "untyped");
    }
}
