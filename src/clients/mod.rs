// External broker clients

pub mod broker;

// Re-export client types
pub use broker::{BrokerClient, BrokerError};
