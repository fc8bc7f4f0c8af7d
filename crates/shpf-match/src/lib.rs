//! Listing matching, price parsing and median aggregation for SHPF.
//!
//! Everything here is synchronous and pure: listings go in, a wide price
//! table comes out. Fetching listings lives in `shpf-adapters`.

pub mod aggregate;
pub mod category;
pub mod matcher;
pub mod normalize;
pub mod pipeline;
pub mod price;
pub mod similarity;
pub mod table;

pub use aggregate::{aggregate, median, PriceAggregator};
pub use category::{trailing_grade, CategoryPolicy};
pub use matcher::{normalize_and_match, ConfigError, NameMatcher, Threshold};
pub use normalize::{normalize, strip_diacritics};
pub use pipeline::{listing_key, ObservationBatch, ObservationCounts, PipelineConfig, PricePipeline};
pub use price::{parse_price, ParsedPrice, PriceParseError};
pub use similarity::{similarity, SimilarityMetric};
pub use table::{build_table, Column, ResultTable, ResultTableBuilder, TableRow, MODEL_COLUMN};

pub const CRATE_NAME: &str = "shpf-match";
