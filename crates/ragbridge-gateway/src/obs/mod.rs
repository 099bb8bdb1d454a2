//! Observability: metrics registry shared by the broker loop, dispatcher and hub.

pub mod metrics;

pub use metrics::{BridgeMetrics, CounterVec, GaugeVec, HistogramVec};
