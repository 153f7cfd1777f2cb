//! HTTP middleware

mod body_limit;
mod metrics;

pub use body_limit::limit_body;
pub use metrics::track_metrics;
