// Observability: metrics recording and Pushgateway delivery

pub mod metrics;

pub use metrics::{init, push_all_metrics};
