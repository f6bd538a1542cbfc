pub mod aggregate;
pub mod annotation;
pub mod collector;
pub mod config;
pub mod error;
pub mod invoker;
pub mod matcher;
pub mod pipeline;
pub mod types;

pub use config::{Config, ReportType, DEFAULT_FLOW_TIMEOUT_MS};
pub use error::CoverageError;
pub use pipeline::collect_coverage;
pub use types::*;
