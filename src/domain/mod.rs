//! Core domain types and logic.

pub mod backtest;
pub mod bar;
pub mod chunk;
pub mod config_validation;
pub mod error;
pub mod exits;
pub mod fill;
pub mod live;
pub mod metrics;
pub mod orchestrator;
pub mod patterns;
pub mod portfolio;
pub mod position;
pub mod retry;
pub mod series;
pub mod settings;
pub mod shard;
pub mod signal;
pub mod sizing;
pub mod strategy;
pub mod universe;
