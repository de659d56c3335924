//! Port traits at the boundary between the domain and the outside world.

pub mod artifact_port;
pub mod broker_port;
pub mod config_port;
pub mod data_port;
pub mod option_chain_port;
