//! Shared types, errors, and configuration for Demonstra.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for statement types and chart-of-account entries
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, EngineConfig, LoggingConfig};
pub use error::AppError;
