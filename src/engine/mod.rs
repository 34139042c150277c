//! Runtime support shared by the analytics and negotiation components
//!
//! This module provides Prometheus metrics and timing helpers.

pub mod metrics;

pub use metrics::{export_metrics, MetricsCollector, Timer};
