//! # TuneGift Common Library
//!
//! Shared code for TuneGift services including:
//! - Database schema, models and status enums
//! - Pipeline event types (PipelineEvent enum)
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
