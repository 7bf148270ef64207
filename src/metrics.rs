use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref CATALOG_FETCHES: IntCounterVec = register_int_counter_vec!(
        "worldtv_catalog_fetches_total",
        "Playlist fetches by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref CATALOG_CACHE_HITS: IntCounter = register_int_counter!(
        "worldtv_catalog_cache_hits_total",
        "Catalog lookups answered from the cache"
    )
    .unwrap();
}

pub fn gather_metrics() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
