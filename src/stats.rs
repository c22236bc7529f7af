//! Legacy `STATS` dump parsing.
//!
//! The daemon answers `STATS` with a semicolon-delimited table:
//!
//! ```text
//! SourceName;SourceId;SourceInstance;State;Type;Number
//! src.internal;s_src#1;;a;processed;59
//! dst.network;d_net#0;tcp,localhost:1234;o;dropped;0
//! ```
//!
//! Bad lines are reported next to the good ones and never stop the parse.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Header line of a legacy stats dump.
pub const STATS_HEADER: &str = "SourceName;SourceId;SourceInstance;State;Type;Number";

const FIELD_COUNT: usize = 6;

/// Lifecycle state of a stats source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    /// `a`
    Active,
    /// `d`
    Dynamic,
    /// `o`: the source no longer exists in the running configuration.
    Orphaned,
}

impl SourceState {
    /// Decode the one-character state column.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'a' => Some(SourceState::Active),
            'd' => Some(SourceState::Dynamic),
            'o' => Some(SourceState::Orphaned),
            _ => None,
        }
    }

    /// The one-character state column.
    pub fn code(self) -> char {
        match self {
            SourceState::Active => 'a',
            SourceState::Dynamic => 'd',
            SourceState::Orphaned => 'o',
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One row of a legacy stats dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub source_name: String,
    pub source_id: String,
    pub source_instance: String,
    pub state: SourceState,
    /// The `Type` column, e.g. `processed` or `dropped`.
    pub kind: String,
    pub number: u64,
}

/// What to do with rows of orphaned sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Report orphaned rows like any other.
    Keep,
    /// Remove orphaned rows.
    #[default]
    Drop,
}

impl OrphanPolicy {
    /// Whether a row in `state` survives this policy.
    pub fn admits(self, state: SourceState) -> bool {
        match self {
            OrphanPolicy::Keep => true,
            OrphanPolicy::Drop => state != SourceState::Orphaned,
        }
    }

    /// Remove the rows this policy rejects.
    pub fn apply(self, stats: &mut Vec<Stat>) {
        stats.retain(|stat| self.admits(stat.state));
    }
}

/// Result of [`parse_stats`]: the decoded rows and the per-line errors.
#[derive(Debug, Default)]
pub struct ParsedStats {
    pub stats: Vec<Stat>,
    pub errors: Vec<StatsError>,
}

impl ParsedStats {
    /// True if every line decoded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a legacy stats dump.
///
/// The first line is the header and is skipped without being checked. Every
/// row is kept regardless of state; see [`OrphanPolicy`] for filtering.
pub fn parse_stats(text: &str) -> ParsedStats {
    let text = text.strip_suffix('\n').unwrap_or(text);
    let mut parsed = ParsedStats::default();

    for line in text.split('\n').skip(1) {
        match parse_line(line) {
            Ok(stat) => parsed.stats.push(stat),
            Err(e) => {
                tracing::debug!("Skipping stats line: {}", e);
                parsed.errors.push(e);
            }
        }
    }

    parsed
}

fn parse_line(line: &str) -> Result<Stat, StatsError> {
    let fields: Vec<&str> = line.split(';').collect();
    if fields.len() != FIELD_COUNT {
        return Err(StatsError::InvalidLine(line.to_string()));
    }

    let mut state = fields[3].chars();
    let state = match (state.next(), state.next()) {
        (Some(code), None) => SourceState::from_code(code),
        _ => None,
    }
    .ok_or_else(|| StatsError::InvalidLine(line.to_string()))?;

    let number = fields[5]
        .parse::<u64>()
        .map_err(|source| StatsError::InvalidNumber {
            line: line.to_string(),
            source,
        })?;

    Ok(Stat {
        source_name: fields[0].to_string(),
        source_id: fields[1].to_string(),
        source_instance: fields[2].to_string(),
        state,
        kind: fields[4].to_string(),
        number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(name: &str, id: &str, instance: &str, state: SourceState, kind: &str, number: u64) -> Stat {
        Stat {
            source_name: name.to_string(),
            source_id: id.to_string(),
            source_instance: instance.to_string(),
            state,
            kind: kind.to_string(),
            number,
        }
    }

    #[test]
    fn test_parse_rows() {
        let text = "SourceName;SourceId;SourceInstance;State;Type;Number\n\
                    source;s_src;;a;processed;65\n\
                    center;;queued;a;processed;124\n\
                    global;scratch_buffers_count;;a;queued;8589934592\n\
                    src.internal;s_src#1;;d;stamp;1673105444\n";

        let parsed = parse_stats(text);

        assert!(parsed.is_clean());
        assert_eq!(
            parsed.stats,
            vec![
                stat("source", "s_src", "", SourceState::Active, "processed", 65),
                stat("center", "", "queued", SourceState::Active, "processed", 124),
                stat("global", "scratch_buffers_count", "", SourceState::Active, "queued", 8589934592),
                stat("src.internal", "s_src#1", "", SourceState::Dynamic, "stamp", 1673105444),
            ]
        );
    }

    #[test]
    fn test_header_only() {
        let parsed = parse_stats(STATS_HEADER);
        assert!(parsed.stats.is_empty());
        assert!(parsed.is_clean());
    }

    #[test]
    fn test_header_is_not_checked() {
        let parsed = parse_stats("whatever\nfilter;ff;;a;matched;3");
        assert_eq!(parsed.stats.len(), 1);
        assert_eq!(parsed.stats[0].number, 3);
    }

    #[test]
    fn test_bad_lines_aggregate() {
        let text = "SourceName;SourceId;SourceInstance;State;Type;Number\n\
                    a;b;c;a;processed\n\
                    src.file;f;;a;processed;1\n\
                    a;b;c;ab;processed;1\n\
                    a;b;c;x;processed;1\n\
                    a;b;c;a;processed;-1\n\
                    a;b;c;a;processed;18446744073709551616\n\
                    dst.file;f;;o;written;2\n";

        let parsed = parse_stats(text);

        assert_eq!(parsed.stats.len(), 2);
        assert_eq!(parsed.stats[0].source_name, "src.file");
        assert_eq!(parsed.stats[1].state, SourceState::Orphaned);
        assert_eq!(parsed.errors.len(), 5);
        assert!(matches!(&parsed.errors[0], StatsError::InvalidLine(l) if l == "a;b;c;a;processed"));
        assert!(matches!(&parsed.errors[1], StatsError::InvalidLine(_)));
        assert!(matches!(&parsed.errors[2], StatsError::InvalidLine(_)));
        assert!(matches!(&parsed.errors[3], StatsError::InvalidNumber { .. }));
        assert!(matches!(&parsed.errors[4], StatsError::InvalidNumber { .. }));
    }

    #[test]
    fn test_empty_row_is_invalid() {
        let parsed = parse_stats("SourceName;SourceId;SourceInstance;State;Type;Number\n\nfilter;ff;;a;matched;0\n");
        assert_eq!(parsed.stats.len(), 1);
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn test_orphan_policy() {
        let mut stats = vec![
            stat("dst.network", "d#0", "tcp", SourceState::Orphaned, "dropped", 0),
            stat("dst.network", "d#1", "tcp", SourceState::Active, "dropped", 0),
            stat("dst.network", "d#2", "tcp", SourceState::Dynamic, "dropped", 0),
        ];

        let mut kept = stats.clone();
        OrphanPolicy::Keep.apply(&mut kept);
        assert_eq!(kept.len(), 3);

        OrphanPolicy::default().apply(&mut stats);
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.state != SourceState::Orphaned));
    }

    #[test]
    fn test_state_codes() {
        for state in [SourceState::Active, SourceState::Dynamic, SourceState::Orphaned] {
            assert_eq!(SourceState::from_code(state.code()), Some(state));
        }
        assert_eq!(SourceState::from_code('x'), None);
        assert_eq!(SourceState::Orphaned.to_string(), "o");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&OrphanPolicy::Keep).unwrap();
        assert_eq!(json, "\"keep\"");
        let policy: OrphanPolicy = serde_json::from_str("\"drop\"").unwrap();
        assert_eq!(policy, OrphanPolicy::Drop);
    }
}
