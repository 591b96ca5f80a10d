//! Custom middleware. Request logging itself comes from
//! `tracing_actix_web::TracingLogger`; only the metrics counters need a
//! hand-written layer.

pub mod metrics;

pub use metrics::MetricsMiddleware;
