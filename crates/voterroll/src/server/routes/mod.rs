pub mod import;
pub mod jobs;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;

use crate::error::ImportError;
use crate::server::state::AppState;

/// Routes mounted under `/api`.
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // Intake, with the body limit raised for document uploads
        .route(
            "/import",
            post(import::upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/import/jobs", get(jobs::list))
        .route("/import/process", post(jobs::process))
        .route("/import/jobs/:id", patch(jobs::update).delete(jobs::remove))
        .route("/import/jobs/:id/reset", post(jobs::reset))
}

/// Runs a service call on the blocking pool. Service calls write files
/// and hold the store lock, so they stay off the async workers.
pub(crate) async fn run_blocking<T, F>(call: F) -> Result<T, ImportError>
where
    F: FnOnce() -> Result<T, ImportError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ImportError::Internal(format!("request task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn test_run_blocking_leaves_runtime_thread() {
        let caller = std::thread::current().id();
        let (worker, in_runtime) = run_blocking(|| {
            Ok((
                std::thread::current().id(),
                tokio::runtime::Handle::try_current().is_ok(),
            ))
        })
        .await
        .unwrap();
        assert_ne!(worker, caller);
        assert!(in_runtime);
    }

    #[tokio::test]
    async fn test_run_blocking_panic_is_internal_error() {
        let err = run_blocking::<(), _>(|| panic!("store exploded"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Internal(_)));
    }
}
