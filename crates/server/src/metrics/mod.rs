pub mod exposition;
pub mod gate_metrics;
