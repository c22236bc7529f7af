//! Metrics module - stats responses as Prometheus metric families.
//!
//! Provides:
//! - the canonical family model
//! - the legacy stats mapping table
//! - exposition text parsing, escape repair and rendering
//! - delay gauge reconstruction
//! - [`to_metric_families`], which ties them together

mod delay;
mod exposition;
mod family;
mod legacy;
mod translate;

pub use delay::{reconcile_delay, DELAY_AGE_FAMILY, DELAY_FAMILY};
pub use exposition::{parse_exposition, render_text, repair_escaping};
pub use family::{labels, FamilyBuilder, Labels, MetricFamily, MetricKind, MetricSet, Sample};
pub use legacy::{ColumnFilter, FamilyName, LabelStyle, LegacyMapping, MappingRule, NameMatch};
pub use translate::{to_metric_families, TranslatorConfig, DEFAULT_NAMESPACE};
