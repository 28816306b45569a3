//! # Funding Evaluator
//!
//! Funding-rate evaluation and trading decisions for leveraged
//! perpetual-futures markets.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `market`: Market data types, collaborator traits, aggregation and a mock source
//! - `strategy`: Funding, fee and profit models, the periodic evaluator and planning
//! - `risk`: Lifecycle rules for held positions
//! - `error`: Per-market skip reasons
//! - `utils`: Shared utilities and decimal parsing

pub mod config;
pub mod error;
pub mod market;
pub mod risk;
pub mod strategy;
pub mod utils;

pub use config::Config;
