//! Service-specific tests
//!
//! These exercise the real service implementations against real child
//! processes and a local HTTP server.


// Common test utilities for services
#[cfg(test)]
pub mod common {
    use std::time::Duration;
    use tokio::time::{sleep, timeout, Instant};

    /// Upper bound for anything that waits on a child process
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Poll `check` until it holds or [`TEST_TIMEOUT`] elapses
    pub async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = Instant::now() + TEST_TIMEOUT;
        while Instant::now() < deadline {
            if check().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Helper to run async operations with timeout
    pub async fn with_timeout<T, F>(future: F) -> Result<T, tokio::time::error::Elapsed>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(TEST_TIMEOUT, future).await
    }
}
