//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_option_chain;
pub mod file_config_adapter;
pub mod gsutil_sync;
pub mod paper_broker;
pub mod parquet_artifacts;
pub mod ranked_csv;
