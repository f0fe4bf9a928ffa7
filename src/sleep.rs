use async_trait::async_trait;
use std::time::Duration;

/// Suspends the current invocation. Injected so tests can observe waits
/// without spending them.
#[async_trait]
pub trait Sleep: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleep;

#[async_trait]
impl Sleep for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}
