//! Prometheus metrics for the AIS state manager

mod registry;

pub use registry::*;
