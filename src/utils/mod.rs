pub mod process;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::errors::{AppError, Result};

/// Awaits `fut`, failing with [`AppError::Timeout`] if `limit` elapses first.
/// With no limit the future is awaited as is.
pub async fn bounded<T, F>(step: &str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        None => fut.await,
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                step: step.to_string(),
                limit,
            }),
        },
    }
}

/// Removes a scratch file. Missing files are fine; anything else is only logged.
pub fn discard_scratch_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove scratch file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_without_limit_passes_result_through() {
        let value = bounded("noop", None, async { Ok::<_, AppError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn bounded_reports_the_step_on_timeout() {
        let err = bounded("slow step", Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await
        .unwrap_err();

        match err {
            AppError::Timeout { step, .. } => assert_eq!(step, "slow step"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn discarding_a_missing_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-written.dump");
        discard_scratch_file(&path);

        std::fs::write(&path, b"x").unwrap();
        discard_scratch_file(&path);
        assert!(!path.exists());
    }

    #[test]
    fn unremovable_scratch_path_is_logged_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        // remove_file refuses directories, standing in for any removal failure
        let path = dir.path().join("stored.dump.gz");
        std::fs::create_dir(&path).unwrap();

        discard_scratch_file(&path);
        assert!(path.is_dir());
    }
}
