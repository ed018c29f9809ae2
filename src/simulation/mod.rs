// Simulation Module
// Local paper-trading broker for running the bot without a brokerage

pub mod mock_broker;

pub use mock_broker::{MockBroker, SimulatedOrder};
