use log::info;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::AggregatorConfig;
use crate::filter::{apply_filter, RecordPredicate};
use crate::models::{CaseField, RawRecord};

/// Field label -> value -> number of occurrences.
pub type StatisticsSnapshot = BTreeMap<String, BTreeMap<String, u64>>;

/// Period label -> sorted distinct maintenance types.
pub type HistoricalSummary = BTreeMap<String, Vec<String>>;

/// Splits a multi-valued cell on the configured delimiter and trims each
/// token, dropping blank and unknown ones. Inner whitespace is kept as is.
/// Repeated tokens are kept, so "A,A" yields "A" twice.
pub fn split_tokens<'a>(value: &'a str, config: &'a AggregatorConfig) -> impl Iterator<Item = String> + 'a {
    value
        .split(config.delimiter)
        .map(str::trim)
        .filter(move |token| !config.is_unknown(token))
        .map(str::to_string)
}

/// Counts delimiter-split tokens of each requested field over the filtered records.
///
/// Every token occurrence counts, including repeats inside one cell. No
/// surviving records means an empty snapshot; surviving records with no value
/// for a field give that field an empty count map.
pub fn tally(
    records: &[RawRecord],
    fields: &[CaseField],
    filter: Option<&dyn RecordPredicate>,
    config: &AggregatorConfig,
) -> StatisticsSnapshot {
    let kept = apply_filter(records, filter);
    let mut snapshot = StatisticsSnapshot::new();
    if kept.is_empty() {
        return snapshot;
    }

    for &field in fields {
        let counts = snapshot.entry(field.label().to_string()).or_default();
        for record in &kept {
            if let Some(value) = record.get(field) {
                for token in split_tokens(value, config) {
                    *counts.entry(token).or_insert(0) += 1;
                }
            }
        }
    }

    info!(
        "Tallied {} fields over {} records",
        snapshot.len(),
        kept.len()
    );
    snapshot
}

/// Maintenance types seen per period, both levels sorted lexicographically.
///
/// Lexicographic order is not chronological for free-text periods such as
/// "昭和40年代" or "最近"; the front end applies its own ordering.
pub fn historical_summary(
    records: &[RawRecord],
    filter: Option<&dyn RecordPredicate>,
    config: &AggregatorConfig,
) -> HistoricalSummary {
    let kept = apply_filter(records, filter);
    let mut periods: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for record in &kept {
        let period = record
            .period
            .as_deref()
            .map(str::trim)
            .filter(|p| !config.is_unknown(p))
            .map(str::to_string)
            .unwrap_or_else(|| config.unknown_period.clone());
        let types = periods.entry(period).or_default();
        if let Some(maintenance) = record.maintenance_type.as_deref() {
            types.extend(split_tokens(maintenance, config));
        }
    }

    info!("Built historical summary with {} periods", periods.len());
    periods
        .into_iter()
        .map(|(period, types)| (period, types.into_iter().collect()))
        .collect()
}
