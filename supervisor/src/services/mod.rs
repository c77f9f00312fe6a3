//! Service implementations
//!
//! Real implementations of the supervisor's traits. These are the production
//! implementations that touch the operating system and the network.

pub mod health_prober;
pub mod process_controller;
pub mod process_table;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use health_prober::HttpHealthProber;
pub use process_controller::RealProcessController;
pub use process_table::SystemProcessTable;
