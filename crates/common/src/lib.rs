//! ShareGrid common library
//!
//! This crate contains shared code used across ShareGrid components.

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::{DispatchMode, ShareGridConfig};
pub use error::{NodeFailure, Result, ShareGridError};
pub use metrics::{MetricsRegistry, METRICS};
