use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database, DbErr};
use std::time::Duration;
use tracing::debug;

/// Checks whether the database behind a URL accepts connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), DbErr>;
}

/// Opens a single short-lived connection and pings it.
#[derive(Debug, Clone)]
pub struct SeaOrmProbe {
    connect_timeout: Duration,
}

impl SeaOrmProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for SeaOrmProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl DatabaseProbe for SeaOrmProbe {
    async fn probe(&self, url: &str) -> Result<(), DbErr> {
        let mut options = ConnectOptions::new(url.to_string());
        options
            .max_connections(1)
            .min_connections(0)
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.connect_timeout)
            .sqlx_logging(false);

        let db = Database::connect(options).await?;
        db.ping().await?;
        debug!("Database connection established successfully");
        Ok(())
    }
}
