//! Read-path metrics

use metrics::counter;
use verikv_core::DictionaryId;

pub fn record_querier_selection(id: &DictionaryId, querier: usize) {
    counter!(
        "verikv_querier_selections_total",
        "dictionary" => id.to_string(),
        "querier" => querier.to_string()
    )
    .increment(1);
}

pub fn record_refresh(id: &DictionaryId, queriers: usize) {
    counter!("verikv_querier_refreshes_total", "dictionary" => id.to_string())
        .increment(queriers as u64);
}
