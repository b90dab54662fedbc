use std::fmt::Display;
use std::future::Future;
use tracing::error;

/// Runs a supplementary side effect whose failure must never affect the
/// operation that triggered it. The error is logged and discarded.
pub async fn best_effort<T, E, F>(label: &str, fut: F)
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    if let Err(err) = fut.await {
        error!("{label} failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        best_effort("doomed write", async { Err::<(), _>("store offline") }).await;
    }
}
