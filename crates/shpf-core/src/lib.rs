//! Core domain model for SHPF: listings, observations and aggregates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "shpf-core";

/// Label used whenever a listing carries no usable category.
pub const UNCATEGORIZED: &str = "Sin Categoría";

/// Marketplaces prices are collected from.
///
/// The declaration order is the column order of the exported table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Cex,
    CashConverters,
    BackMarket,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Cex, Source::CashConverters, Source::BackMarket];

    /// Stable identifier used in config files and fixture paths.
    pub fn id(self) -> &'static str {
        match self {
            Source::Cex => "cex",
            Source::CashConverters => "cash-converters",
            Source::BackMarket => "back-market",
        }
    }

    /// Prefix put in front of category labels in the result table.
    pub fn column_prefix(self) -> &'static str {
        match self {
            Source::Cex => "Cex",
            Source::CashConverters => "Cash Converters",
            Source::BackMarket => "Back Market",
        }
    }

    pub fn column_name(self, category: &str) -> String {
        format!("{} {}", self.column_prefix(), category)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSource(pub String);

impl fmt::Display for UnknownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown source `{}`", self.0)
    }
}

impl std::error::Error for UnknownSource {}

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.id() == s.trim())
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// One scraped product entry, exactly as the listing source saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub raw_name: String,
    pub raw_price: String,
    pub category_hint: Option<String>,
    pub source: Source,
}

impl ListingRecord {
    pub fn new(source: Source, raw_name: impl Into<String>, raw_price: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            raw_price: raw_price.into(),
            category_hint: None,
            source,
        }
    }

    pub fn with_category_hint(mut self, hint: impl Into<String>) -> Self {
        self.category_hint = Some(hint.into());
        self
    }
}

/// Outcome of comparing a listing name against a requested model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub accepted: bool,
    pub score: f64,
}

/// A parsed price attributed to a (model, category) group.
///
/// `price` is always finite and non-negative. `listing_key` is the normalized
/// name plus the parsed price; two observations sharing model, category and key are the
/// same listing seen twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub model: String,
    pub category: String,
    pub price: f64,
    pub listing_key: String,
}

/// Median price of one (model, category) group. Groups without observations
/// never produce a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub model: String,
    pub category: String,
    pub median_price: f64,
    pub observations: usize,
}
