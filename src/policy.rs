//! Node privacy policy.
//!
//! A node's policy is read once from an environment-style key/value source through
//! [`PolicySource`], so the computation core never depends on where the values come from.
//!
//! | key | type | default |
//! |---|---|---|
//! | `SUMMARY_MINIMUM_ROWS` | integer | 5 |
//! | `SUMMARY_PRIVACY_THRESHOLD` | integer | 5 |
//! | `SUMMARY_ALLOWED_COLUMNS` | comma-separated names | empty |
//! | `SUMMARY_DISALLOWED_COLUMNS` | comma-separated names | empty |
//! | `SUMMARY_ALLOW_<STAT>` (see [`StatisticKind`]) | bool | true |
//! | `SUMMARY_MASK_LOW_FREQUENCY_VALUES` | bool | false |
//! | `SUMMARY_ENFORCE_COLUMN_MINIMUM_ROWS` | bool | false |

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{SummaryError, SummaryResult};

pub const ENV_MINIMUM_ROWS: &str = "SUMMARY_MINIMUM_ROWS";
pub const ENV_PRIVACY_THRESHOLD: &str = "SUMMARY_PRIVACY_THRESHOLD";
pub const ENV_ALLOWED_COLUMNS: &str = "SUMMARY_ALLOWED_COLUMNS";
pub const ENV_DISALLOWED_COLUMNS: &str = "SUMMARY_DISALLOWED_COLUMNS";
pub const ENV_MASK_LOW_FREQUENCY_VALUES: &str = "SUMMARY_MASK_LOW_FREQUENCY_VALUES";
pub const ENV_ENFORCE_COLUMN_MINIMUM_ROWS: &str = "SUMMARY_ENFORCE_COLUMN_MINIMUM_ROWS";

pub const DEFAULT_MINIMUM_ROWS: usize = 5;
pub const DEFAULT_PRIVACY_THRESHOLD: usize = 5;

/// Statistics a node may individually refuse to share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatisticKind {
    Min,
    Max,
    Std,
    Sum,
    Count,
    Missing,
    Variance,
    CountsUniqueValues,
    NumCompleteRows,
}

impl StatisticKind {
    /// All kinds, in switch order.
    pub const ALL: [StatisticKind; 9] = [
        StatisticKind::Min,
        StatisticKind::Max,
        StatisticKind::Std,
        StatisticKind::Sum,
        StatisticKind::Count,
        StatisticKind::Missing,
        StatisticKind::Variance,
        StatisticKind::CountsUniqueValues,
        StatisticKind::NumCompleteRows,
    ];

    /// Name of the policy key toggling this statistic.
    pub fn env_key(self) -> &'static str {
        match self {
            StatisticKind::Min => "SUMMARY_ALLOW_MIN",
            StatisticKind::Max => "SUMMARY_ALLOW_MAX",
            StatisticKind::Std => "SUMMARY_ALLOW_STD",
            StatisticKind::Sum => "SUMMARY_ALLOW_SUM",
            StatisticKind::Count => "SUMMARY_ALLOW_COUNT",
            StatisticKind::Missing => "SUMMARY_ALLOW_MISSING",
            StatisticKind::Variance => "SUMMARY_ALLOW_VARIANCE",
            StatisticKind::CountsUniqueValues => "SUMMARY_ALLOW_COUNTS_UNIQUE_VALUES",
            StatisticKind::NumCompleteRows => "SUMMARY_ALLOW_NUM_COMPLETE_ROWS",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// The set of statistics a node is willing to share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatCapabilities {
    allowed: [bool; 9],
}

impl StatCapabilities {
    /// Every statistic allowed.
    pub fn all() -> Self {
        Self { allowed: [true; 9] }
    }

    /// Whether `kind` may be shared.
    pub fn allows(&self, kind: StatisticKind) -> bool {
        self.allowed[kind.index()]
    }

    /// Returns a copy with `kind` set to `allowed`.
    pub fn with(mut self, kind: StatisticKind, allowed: bool) -> Self {
        self.allowed[kind.index()] = allowed;
        self
    }
}

impl Default for StatCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Privacy policy of a single data station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Nodes with fewer rows do not participate at all.
    pub minimum_rows: usize,
    /// Minimum number of distinct values before a unique-value map may be shared.
    pub privacy_threshold: usize,
    /// If non-empty, only these columns may be used.
    pub allowed_columns: BTreeSet<String>,
    /// Columns that may not be used. Ignored when `allowed_columns` is non-empty.
    pub disallowed_columns: BTreeSet<String>,
    /// Per-statistic switches.
    pub capabilities: StatCapabilities,
    /// Also withhold a unique-value map if any single value occurs fewer than
    /// `privacy_threshold` times.
    pub mask_low_frequency_values: bool,
    /// Also withhold any column holding fewer than `minimum_rows` non-missing values.
    pub enforce_column_minimum_rows: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            minimum_rows: DEFAULT_MINIMUM_ROWS,
            privacy_threshold: DEFAULT_PRIVACY_THRESHOLD,
            allowed_columns: BTreeSet::new(),
            disallowed_columns: BTreeSet::new(),
            capabilities: StatCapabilities::all(),
            mask_low_frequency_values: false,
            enforce_column_minimum_rows: false,
        }
    }
}

impl PolicyConfig {
    /// Load a policy from `source`, falling back to defaults for unset keys.
    pub fn load(source: &dyn PolicySource) -> SummaryResult<Self> {
        let mut capabilities = StatCapabilities::all();
        for kind in StatisticKind::ALL {
            capabilities = capabilities.with(kind, read_bool(source, kind.env_key(), true)?);
        }

        Ok(Self {
            minimum_rows: read_usize(source, ENV_MINIMUM_ROWS, DEFAULT_MINIMUM_ROWS)?,
            privacy_threshold: read_usize(source, ENV_PRIVACY_THRESHOLD, DEFAULT_PRIVACY_THRESHOLD)?,
            allowed_columns: read_list(source, ENV_ALLOWED_COLUMNS),
            disallowed_columns: read_list(source, ENV_DISALLOWED_COLUMNS),
            capabilities,
            mask_low_frequency_values: read_bool(source, ENV_MASK_LOW_FREQUENCY_VALUES, false)?,
            enforce_column_minimum_rows: read_bool(source, ENV_ENFORCE_COLUMN_MINIMUM_ROWS, false)?,
        })
    }

    /// Load a policy from the process environment.
    pub fn from_env() -> SummaryResult<Self> {
        Self::load(&EnvPolicySource)
    }

    /// Whether `column` passes the allow/deny lists. The allow-list wins when both are set.
    pub fn admits_column(&self, column: &str) -> bool {
        if !self.allowed_columns.is_empty() {
            self.allowed_columns.contains(column)
        } else {
            !self.disallowed_columns.contains(column)
        }
    }
}

/// Source of environment-style policy values.
pub trait PolicySource {
    /// Raw value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads policy values from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvPolicySource;

impl PolicySource for EnvPolicySource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl PolicySource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl PolicySource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

fn read_raw(source: &dyn PolicySource, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_usize(source: &dyn PolicySource, key: &str, default: usize) -> SummaryResult<usize> {
    match read_raw(source, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<usize>().map_err(|e| SummaryError::InvalidPolicy {
            key: key.to_string(),
            value: raw.clone(),
            message: e.to_string(),
        }),
    }
}

fn read_bool(source: &dyn PolicySource, key: &str, default: bool) -> SummaryResult<bool> {
    match read_raw(source, key) {
        None => Ok(default),
        Some(raw) => parse_bool(&raw).map_err(|message| SummaryError::InvalidPolicy {
            key: key.to_string(),
            value: raw.clone(),
            message,
        }),
    }
}

fn read_list(source: &dyn PolicySource, key: &str) -> BTreeSet<String> {
    read_raw(source, key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}
