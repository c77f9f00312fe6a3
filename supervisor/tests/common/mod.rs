//! Common test utilities and infrastructure
//!
//! Shared fixtures, a scriptable fake server and a log capture layer used by
//! the supervisor test suites.

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
#[allow(unused_imports)]
pub use fixtures::TestFixtures;
#[allow(unused_imports)]
pub use helpers::{FakeServer, LogCapture, TestHelpers};
