//! VoiceMatch Client Core Library
//!
//! This crate provides the foundational types shared by the VoiceMatch
//! client crates. It includes:
//!
//! - Wire models for the calls, listener, KYC and feedback endpoints
//! - The client-side billing estimate (display only, never authoritative)
//! - Unified error handling for API and state-machine failures
//! - Application configuration

pub mod billing;
pub mod config;
pub mod error;
pub mod models;

pub use billing::{BillingMeter, CostEstimate};
pub use config::AppConfig;
pub use error::ClientError;

/// Result type alias using ClientError
pub type ClientResult<T> = Result<T, ClientError>;
