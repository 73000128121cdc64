//! Credit ML - Rust библиотека оценки ипотечных заявок

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod sample_data;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use models::*;
pub use pipeline::CreditPipeline;
pub use preprocessing::*;
pub use types::*;
