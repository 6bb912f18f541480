//! Cancellation of store round-trips.

use std::future::Future;

use sea_orm::DbErr;
use tokio_util::sync::CancellationToken;

use crate::error::{RepoError, RepoResult};

/// Run one store round-trip, racing it against `token`.
///
/// An already-cancelled token fails before the future is polled. When the token fires
/// mid-flight the store future is dropped, which aborts the request (and rolls back an
/// uncommitted transaction it owns).
pub async fn run<T, F>(token: Option<&CancellationToken>, fut: F) -> RepoResult<T>
where
    F: Future<Output = Result<T, DbErr>>,
{
    let Some(token) = token else {
        return fut.await.map_err(RepoError::from);
    };
    if token.is_cancelled() {
        return Err(RepoError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RepoError::Cancelled),
        res = fut => res.map_err(RepoError::from),
    }
}

/// Same as [`run`] for futures already speaking [`RepoError`].
pub async fn run_repo<T, F>(token: Option<&CancellationToken>, fut: F) -> RepoResult<T>
where
    F: Future<Output = RepoResult<T>>,
{
    let Some(token) = token else {
        return fut.await;
    };
    if token.is_cancelled() {
        return Err(RepoError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RepoError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_token_passes_through() {
        let res = run(None, async { Ok::<_, DbErr>(7) }).await;
        assert_eq!(res.unwrap(), 7);

        let res = run(None, async { Err::<u8, _>(DbErr::Custom("boom".into())) }).await;
        assert!(matches!(res, Err(RepoError::Store(DbErr::Custom(m))) if m == "boom"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_never_polls() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let token = CancellationToken::new();
        token.cancel();
        let polled = AtomicBool::new(false);
        let res = run(Some(&token), async {
            polled.store(true, Ordering::SeqCst);
            Ok::<u8, DbErr>(0)
        })
        .await;
        assert!(matches!(res, Err(RepoError::Cancelled)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_mid_flight() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let res = run(
            Some(&token),
            std::future::pending::<Result<u8, DbErr>>(),
        )
        .await;
        assert!(matches!(res, Err(RepoError::Cancelled)));
    }

    #[tokio::test]
    async fn test_live_token_completes() {
        let token = CancellationToken::new();
        let res = run_repo(Some(&token), async { Ok::<_, RepoError>("done") }).await;
        assert_eq!(res.unwrap(), "done");
    }
}
