use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::connection::DatabaseProbe;
use crate::errors::{DblessError, DblessResult};
use crate::models::ContainerHandle;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Stand-in deadline for timeouts too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Poll `url` until the database in `handle` accepts connections.
pub async fn wait_ready(
    probe: &dyn DatabaseProbe,
    handle: &ContainerHandle,
    url: &str,
    timeout: Duration,
) -> DblessResult<()> {
    info!("Waiting for database in container {}", handle.name);
    let start = Instant::now();
    let deadline = start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE);

    loop {
        match probe.probe(url).await {
            Ok(()) => {
                info!("Connected");
                return Ok(());
            }
            Err(e) => {
                if Instant::now() + POLL_INTERVAL > deadline {
                    warn!("Last connection attempt failed: {}", e);
                    return Err(DblessError::ReadinessTimeout { timeout });
                }
                warn!("Trying to connect again... ({})", e);
                sleep(POLL_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::MockDatabaseProbe;
    use sea_orm::DbErr;

    fn handle() -> ContainerHandle {
        ContainerHandle {
            id: "abc123".to_string(),
            name: "dbless".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retries() {
        let mut probe = MockDatabaseProbe::new();
        let mut attempts = 0;
        probe.expect_probe().times(3).returning(move |_| {
            attempts += 1;
            if attempts < 3 {
                Err(DbErr::Conn(sea_orm::RuntimeErr::Internal(
                    "connection refused".to_string(),
                )))
            } else {
                Ok(())
            }
        });

        wait_ready(&probe, &handle(), "postgres://localhost/db", DEFAULT_READY_TIMEOUT)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeout_does_not_overflow() {
        let mut probe = MockDatabaseProbe::new();
        let mut attempts = 0;
        probe.expect_probe().times(2).returning(move |_| {
            attempts += 1;
            if attempts < 2 {
                Err(DbErr::Conn(sea_orm::RuntimeErr::Internal(
                    "connection refused".to_string(),
                )))
            } else {
                Ok(())
            }
        });

        wait_ready(&probe, &handle(), "postgres://localhost/db", Duration::MAX)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let mut probe = MockDatabaseProbe::new();
        probe.expect_probe().returning(|_| {
            Err(DbErr::Conn(sea_orm::RuntimeErr::Internal(
                "connection refused".to_string(),
            )))
        });

        let err = wait_ready(
            &probe,
            &handle(),
            "postgres://localhost/db",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DblessError::ReadinessTimeout { timeout } if timeout.as_secs() == 5));
    }
}
