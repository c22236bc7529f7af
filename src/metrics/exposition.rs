//! Prometheus text exposition format.
//!
//! Parsing covers the subset the daemon emits: `# HELP`, `# TYPE` with
//! `counter`, `gauge` or `untyped`, samples with optional labels and an
//! optional millisecond timestamp. `summary` and `histogram` families are
//! reported and their samples skipped.
//!
//! Rendering goes through the `prometheus` crate's [`TextEncoder`].

use std::collections::HashSet;

use prometheus::proto;
use prometheus::{Encoder, TextEncoder};

use super::family::{FamilyBuilder, Labels, MetricFamily, MetricKind, MetricSet, Sample};
use crate::error::MetricError;

/// Escape every backslash that does not start a valid escape sequence.
///
/// Older daemons emitted label values with raw backslashes (`\a`, `\x..`).
/// Valid sequences (`\\`, `\n`, `\"`) are kept; everything else, including a
/// trailing lone backslash, becomes `\\`.
pub fn repair_escaping(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next @ ('\\' | 'n' | '"')) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }

    out
}

/// Parse exposition text into families.
///
/// Parsing stops at the first malformed line; families read up to that point
/// are returned along with an [`MetricError::Exposition`]. Families without
/// samples are not returned.
pub fn parse_exposition(text: &str) -> MetricSet {
    let mut parser = Parser::default();
    let mut errors = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        if let Err(reason) = parser.line(line, &mut errors) {
            tracing::warn!("Malformed exposition text at line {}: {}", idx + 1, reason);
            errors.push(MetricError::Exposition {
                line: idx + 1,
                reason,
            });
            break;
        }
    }

    let Parser {
        builder, skipped, ..
    } = parser;
    let families = builder
        .build()
        .into_iter()
        .filter(|f| !f.samples.is_empty() && !skipped.contains(&f.name))
        .collect();

    MetricSet { families, errors }
}

#[derive(Default)]
struct Parser {
    builder: FamilyBuilder,
    /// Families declared with a type this crate does not carry.
    skipped: HashSet<String>,
    /// Families that already had a TYPE line.
    typed: HashSet<String>,
}

impl Parser {
    fn line(&mut self, line: &str, errors: &mut Vec<MetricError>) -> Result<(), String> {
        let mut cur = Cursor::new(line);
        cur.skip_whitespace();

        match cur.peek() {
            None => Ok(()),
            Some('#') => {
                cur.bump();
                self.comment(cur, errors)
            }
            Some(_) => self.sample(cur),
        }
    }

    fn comment(&mut self, mut cur: Cursor<'_>, errors: &mut Vec<MetricError>) -> Result<(), String> {
        cur.skip_whitespace();
        let keyword = cur.take_while(|c| !c.is_whitespace());
        if keyword != "HELP" && keyword != "TYPE" {
            return Ok(());
        }

        cur.skip_whitespace();
        let name = cur.metric_name()?;
        if name.is_empty() {
            return Err(format!("missing metric name after # {}", keyword));
        }

        if keyword == "HELP" {
            cur.skip_whitespace();
            let help = unescape_help(cur.rest());
            let family = self.builder.entry(name);
            if !family.help.is_empty() {
                return Err(format!("second HELP line for metric {:?}", name));
            }
            family.help = help;
            return Ok(());
        }

        if !self.typed.insert(name.to_string()) {
            return Err(format!("second TYPE line for metric {:?}", name));
        }

        cur.skip_whitespace();
        let kind = cur.take_while(|c| !c.is_whitespace());
        cur.skip_whitespace();
        if !cur.is_empty() {
            return Err(format!("unexpected text after type of metric {:?}", name));
        }

        let kind = match kind {
            "counter" => MetricKind::Counter,
            "gauge" => MetricKind::Gauge,
            "untyped" => MetricKind::Untyped,
            "summary" | "histogram" => {
                errors.push(MetricError::UnsupportedType {
                    family: name.to_string(),
                    kind: kind.to_string(),
                });
                self.skipped.insert(name.to_string());
                return Ok(());
            }
            other => return Err(format!("unknown metric type {:?}", other)),
        };

        let family = self.builder.entry(name);
        if !family.samples.is_empty() {
            return Err(format!("TYPE line for metric {:?} after its samples", name));
        }
        family.kind = kind;
        Ok(())
    }

    fn sample(&mut self, mut cur: Cursor<'_>) -> Result<(), String> {
        let name = cur.metric_name()?;
        if name.is_empty() {
            return Err("invalid metric name".to_string());
        }

        let braced = cur.peek() == Some('{');
        let labels = if braced {
            cur.bump();
            cur.labels()?
        } else {
            Labels::new()
        };

        // Blanks are optional after a closing brace
        if (!cur.skip_whitespace() && !braced) || cur.is_empty() {
            return Err(format!("missing value of metric {:?}", name));
        }
        let value = parse_value(cur.take_while(|c| !c.is_whitespace()))?;

        cur.skip_whitespace();
        let timestamp_ms = if cur.is_empty() {
            None
        } else {
            let raw = cur.take_while(|c| !c.is_whitespace());
            Some(
                raw.parse::<i64>()
                    .map_err(|_| format!("invalid timestamp {:?}", raw))?,
            )
        };

        cur.skip_whitespace();
        if !cur.is_empty() {
            return Err(format!("unexpected text after sample of metric {:?}", name));
        }

        if self.is_skipped(name) {
            return Ok(());
        }

        self.builder.entry(name).samples.push(Sample {
            labels,
            value,
            timestamp_ms,
        });
        Ok(())
    }

    fn is_skipped(&self, name: &str) -> bool {
        if self.skipped.contains(name) {
            return true;
        }
        ["_sum", "_count", "_bucket"].iter().any(|suffix| {
            name.strip_suffix(suffix)
                .map_or(false, |base| self.skipped.contains(base))
        })
    }
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.rest = &self.rest[c.len_utf8()..];
        Some(c)
    }

    fn rest(&self) -> &'a str {
        self.rest
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let end = self
            .rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(self.rest.len(), |(i, _)| i);
        let (taken, rest) = self.rest.split_at(end);
        self.rest = rest;
        taken
    }

    /// Returns true if any whitespace was skipped.
    fn skip_whitespace(&mut self) -> bool {
        !self.take_while(|c| c == ' ' || c == '\t').is_empty()
    }

    fn metric_name(&mut self) -> Result<&'a str, String> {
        let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(format!("invalid metric name {:?}", name));
        }
        Ok(name)
    }

    /// Parse `name="value",...}` after the opening brace.
    fn labels(&mut self) -> Result<Labels, String> {
        let mut labels = Labels::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(labels);
            }

            let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(format!("invalid label name {:?}", name));
            }
            self.skip_whitespace();
            if self.bump() != Some('=') {
                return Err(format!("expected '=' after label name {:?}", name));
            }
            self.skip_whitespace();
            if self.bump() != Some('"') {
                return Err(format!("expected '\"' to open value of label {:?}", name));
            }
            let value = self.label_value()?;

            if labels.insert(name.to_string(), value).is_some() {
                return Err(format!("duplicate label name {:?}", name));
            }

            self.skip_whitespace();
            match self.bump() {
                Some(',') => {}
                Some('}') => return Ok(labels),
                _ => return Err(format!("expected ',' or '}}' after label {:?}", name)),
            }
        }
    }

    /// Read an escaped label value up to the closing quote.
    fn label_value(&mut self) -> Result<String, String> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated label value".to_string()),
                Some('"') => return Ok(value),
                Some('\\') => match self.bump() {
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('n') => value.push('\n'),
                    Some(c) => return Err(format!("invalid escape sequence '\\{}'", c)),
                    None => return Err("unterminated label value".to_string()),
                },
                Some(c) => value.push(c),
            }
        }
    }
}

fn parse_value(raw: &str) -> Result<f64, String> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse::<f64>()
            .map_err(|_| format!("invalid sample value {:?}", raw)),
    }
}

fn unescape_help(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some('\\')) => {
                out.push('\\');
                chars.next();
            }
            ('\\', Some('n')) => {
                out.push('\n');
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Encode families as exposition text.
///
/// Families without samples are skipped. Untyped families are written as
/// gauges.
pub fn render_text(families: &[MetricFamily]) -> Result<String, MetricError> {
    let protos: Vec<proto::MetricFamily> = families
        .iter()
        .filter(|f| !f.samples.is_empty())
        .map(to_proto)
        .collect();

    let mut buf = Vec::new();
    TextEncoder::new().encode(&protos, &mut buf)?;
    String::from_utf8(buf).map_err(|e| MetricError::Render(prometheus::Error::Msg(e.to_string())))
}

fn to_proto(family: &MetricFamily) -> proto::MetricFamily {
    let mut mf = proto::MetricFamily::default();
    mf.set_name(family.name.clone());
    mf.set_help(family.help.clone());
    // The encoder has no untyped support
    let counter = family.kind == MetricKind::Counter;
    mf.set_field_type(if counter {
        proto::MetricType::COUNTER
    } else {
        proto::MetricType::GAUGE
    });

    for sample in &family.samples {
        let mut m = proto::Metric::default();
        for (name, value) in &sample.labels {
            let mut pair = proto::LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            m.mut_label().push(pair);
        }
        if counter {
            let mut value = proto::Counter::default();
            value.set_value(sample.value);
            m.set_counter(value);
        } else {
            let mut value = proto::Gauge::default();
            value.set_value(sample.value);
            m.set_gauge(value);
        }
        if let Some(ts) = sample.timestamp_ms {
            m.set_timestamp_ms(ts);
        }
        mf.mut_metric().push(m);
    }

    mf
}
