//! Stream filtering: level, component and free-text predicates over log entries
//!
//! `apply` is pure and order-preserving; applying the same filter to its own
//! output returns the same output.

use crate::types::{LogEntry, LogLevel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Level predicate. `"all"` on the wire is the wildcard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LevelFilter {
    #[default]
    All,
    Only(LogLevel),
}

impl LevelFilter {
    pub fn matches(&self, level: LogLevel) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Only(wanted) => *wanted == level,
        }
    }
}

impl FromStr for LevelFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") || s.trim().is_empty() {
            Ok(LevelFilter::All)
        } else {
            s.parse().map(LevelFilter::Only)
        }
    }
}

impl TryFrom<String> for LevelFilter {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LevelFilter> for String {
    fn from(f: LevelFilter) -> Self {
        f.to_string()
    }
}

impl fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelFilter::All => f.write_str("all"),
            LevelFilter::Only(level) => write!(f, "{}", level),
        }
    }
}

/// Component predicate: exact, case-sensitive match on the source tag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComponentFilter {
    #[default]
    All,
    Only(String),
}

impl ComponentFilter {
    pub fn matches(&self, component: &str) -> bool {
        match self {
            ComponentFilter::All => true,
            ComponentFilter::Only(wanted) => wanted == component,
        }
    }
}

impl From<String> for ComponentFilter {
    fn from(s: String) -> Self {
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            ComponentFilter::All
        } else {
            ComponentFilter::Only(s)
        }
    }
}

impl From<&str> for ComponentFilter {
    fn from(s: &str) -> Self {
        ComponentFilter::from(s.to_string())
    }
}

impl From<ComponentFilter> for String {
    fn from(f: ComponentFilter) -> Self {
        match f {
            ComponentFilter::All => "all".to_string(),
            ComponentFilter::Only(name) => name,
        }
    }
}

/// The consumer's current view settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub level: LevelFilter,
    pub component: ComponentFilter,
    /// Case-insensitive substring matched against message and component.
    pub search: String,
}

impl FilterState {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn component(mut self, component: impl Into<ComponentFilter>) -> Self {
        self.component = component.into();
        self
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.search = query.into();
        self
    }

    pub fn is_passthrough(&self) -> bool {
        self.level == LevelFilter::All
            && self.component == ComponentFilter::All
            && self.search.is_empty()
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.level.matches(entry.level)
            && self.component.matches(&entry.component)
            && matches_query(entry, &self.search.to_lowercase())
    }
}

fn matches_query(entry: &LogEntry, query_lower: &str) -> bool {
    query_lower.is_empty()
        || entry.message.to_lowercase().contains(query_lower)
        || entry.component.to_lowercase().contains(query_lower)
}

/// Entries satisfying every clause of `filter`, in input order.
pub fn apply(entries: &[LogEntry], filter: &FilterState) -> Vec<LogEntry> {
    if filter.is_passthrough() {
        return entries.to_vec();
    }
    let query = filter.search.to_lowercase();
    entries
        .iter()
        .filter(|e| {
            filter.level.matches(e.level)
                && filter.component.matches(&e.component)
                && matches_query(e, &query)
        })
        .cloned()
        .collect()
}

/// Per-level tallies, with every level present (zero when absent).
pub fn level_counts(entries: &[LogEntry]) -> BTreeMap<LogLevel, usize> {
    let mut counts: BTreeMap<LogLevel, usize> = LogLevel::ALL.iter().map(|l| (*l, 0)).collect();
    for entry in entries {
        *counts.entry(entry.level).or_insert(0) += 1;
    }
    counts
}

/// Distinct component tags in first-seen order.
pub fn components(entries: &[LogEntry]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::new();
    for entry in entries {
        if seen.insert(entry.component.as_str()) {
            ordered.push(entry.component.clone());
        }
    }
    ordered
}
