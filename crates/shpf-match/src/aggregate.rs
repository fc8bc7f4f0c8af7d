use std::collections::{BTreeMap, HashSet};

use shpf_core::{AggregateRow, PriceObservation};
use tracing::debug;

/// Median of `values`; mean of the two middle values for even counts.
/// `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Groups price observations by (model, category).
///
/// Observations repeating an already seen (model, category, listing_key)
/// triple are ignored, so feeding the same pass twice leaves every median
/// unchanged while genuinely new observations are merged into their group.
#[derive(Debug, Default, Clone)]
pub struct PriceAggregator {
    groups: BTreeMap<(String, String), Vec<f64>>,
    seen: HashSet<(String, String, String)>,
    duplicates: usize,
}

impl PriceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the observation was a duplicate or carried an
    /// invalid price.
    pub fn push(&mut self, observation: PriceObservation) -> bool {
        if !observation.price.is_finite() || observation.price < 0.0 {
            debug!(price = observation.price, model = %observation.model, "dropping invalid price");
            return false;
        }
        let PriceObservation {
            model,
            category,
            price,
            listing_key,
        } = observation;
        if !self
            .seen
            .insert((model.clone(), category.clone(), listing_key))
        {
            self.duplicates += 1;
            return false;
        }
        self.groups.entry((model, category)).or_default().push(price);
        true
    }

    pub fn extend(&mut self, observations: impl IntoIterator<Item = PriceObservation>) {
        for observation in observations {
            self.push(observation);
        }
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One row per non-empty group, ordered by model then category.
    pub fn rows(&self) -> Vec<AggregateRow> {
        self.groups
            .iter()
            .filter_map(|((model, category), prices)| {
                median(prices).map(|median_price| AggregateRow {
                    model: model.clone(),
                    category: category.clone(),
                    median_price,
                    observations: prices.len(),
                })
            })
            .collect()
    }
}

pub fn aggregate(observations: impl IntoIterator<Item = PriceObservation>) -> Vec<AggregateRow> {
    let mut aggregator = PriceAggregator::new();
    aggregator.extend(observations);
    aggregator.rows()
}
