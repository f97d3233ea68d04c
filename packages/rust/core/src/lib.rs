//! Question answering over school records.
//!
//! This crate turns a classified question into a safe, bounded backend
//! query, then summarizes and renders whatever rows come back. The
//! [`Assistant`] ties the steps together behind a single [`Fetcher`].
//!
//! [`Fetcher`]: aulabot_shared::Fetcher

pub mod analyzer;
pub mod anomaly;
pub mod assistant;
pub mod builder;
pub mod guard;
pub mod render;
mod rest;
mod sql;

pub use analyzer::{Analysis, Analyzer, SystemStatistics};
pub use anomaly::{Anomaly, AnomalyKind, detect_anomalies};
pub use assistant::{Answer, Assistant, HealthReport};
pub use builder::{CourseFilter, DataRequest, QueryBuilder};
pub use render::Renderer;
