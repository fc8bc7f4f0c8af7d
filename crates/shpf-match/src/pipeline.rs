use serde::Serialize;
use shpf_core::{ListingRecord, PriceObservation};
use tracing::{debug, warn};

use crate::category::CategoryPolicy;
use crate::matcher::NameMatcher;
use crate::normalize::normalize;
use crate::price::{parse_price, ParsedPrice};

/// Per-source settings for turning listings into observations.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub matcher: NameMatcher,
    pub category_policy: CategoryPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObservationCounts {
    pub listings: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub unavailable: usize,
    pub malformed: usize,
}

impl ObservationCounts {
    pub fn merge(&mut self, other: ObservationCounts) {
        self.listings += other.listings;
        self.matched += other.matched;
        self.unmatched += other.unmatched;
        self.unavailable += other.unavailable;
        self.malformed += other.malformed;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObservationBatch {
    pub observations: Vec<PriceObservation>,
    pub counts: ObservationCounts,
}

#[derive(Debug, Clone, Copy)]
pub struct PricePipeline {
    config: PipelineConfig,
}

impl PricePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Filters `records` down to listings of `model`, labels and prices them.
    ///
    /// Listings below the threshold, sold out, or with unparseable prices are
    /// counted and skipped; nothing here fails the caller.
    pub fn observe<'a>(
        &self,
        model: &str,
        records: impl IntoIterator<Item = &'a ListingRecord>,
    ) -> ObservationBatch {
        let mut batch = ObservationBatch::default();
        for record in records {
            batch.counts.listings += 1;

            let decision = self.config.matcher.evaluate(&record.raw_name, model);
            if !decision.accepted {
                batch.counts.unmatched += 1;
                debug!(name = %record.raw_name, model, score = decision.score, "listing below threshold");
                continue;
            }
            batch.counts.matched += 1;

            let price = match parse_price(&record.raw_price) {
                Ok(ParsedPrice::Amount(price)) => price,
                Ok(ParsedPrice::Unavailable) => {
                    batch.counts.unavailable += 1;
                    debug!(name = %record.raw_name, source = %record.source, "listing sold out");
                    continue;
                }
                Err(err) => {
                    batch.counts.malformed += 1;
                    warn!(%err, name = %record.raw_name, source = %record.source, "dropping listing");
                    continue;
                }
            };

            batch.observations.push(PriceObservation {
                model: model.to_string(),
                category: self.config.category_policy.classify(record),
                price,
                listing_key: listing_key(record, price),
            });
        }
        batch
    }
}

/// Normalized name plus parsed price, identifying a listing for
/// de-duplication.
///
/// The price goes in parsed: `normalize` drops separators, so raw text such
/// as `12,99 €` and `1.299 €` would collide.
pub fn listing_key(record: &ListingRecord, price: f64) -> String {
    format!("{} {price}", normalize(&record.raw_name))
}
