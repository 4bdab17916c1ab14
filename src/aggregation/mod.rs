//! Aggregation engine: derived experiment views memoized through a TTL cache.

pub mod aggregator;
pub mod cache;

pub use aggregator::MetricsAggregator;
pub use cache::TtlCache;
