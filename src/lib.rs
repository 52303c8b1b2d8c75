pub mod classifier;
pub mod config;
pub mod error;
pub mod labels;
pub mod prediction;
pub mod preprocessing;
pub mod server;
pub mod state;
