//! Fire-and-forget background work.

use std::future::Future;

use faster_app_core::AppResult;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Runs `task` on the runtime without tying it to the current response.
///
/// Failures and panics are logged under `name`; nothing is reported back to
/// the request that spawned the task.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use faster_app_views::tasks::spawn_background;
///
/// let handle = spawn_background("send-welcome-mail", async { Ok(()) });
/// handle.await.unwrap();
/// # }
/// ```
pub fn spawn_background<F>(name: impl Into<String>, task: F) -> JoinHandle<()>
where
    F: Future<Output = AppResult<()>> + Send + 'static,
{
    let name = name.into();
    let span = tracing::info_span!("background", task = %name);
    tokio::spawn(
        async move {
            let inner = tokio::spawn(task.in_current_span());
            match inner.await {
                Ok(Ok(())) => tracing::debug!("background task finished"),
                Ok(Err(err)) => tracing::warn!(error = %err, detail = ?err.detail(), "background task failed"),
                Err(join) if join.is_panic() => tracing::error!("background task panicked"),
                Err(_) => tracing::debug!("background task cancelled"),
            }
        }
        .instrument(span),
    )
}
