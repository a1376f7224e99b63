use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::{info, instrument};

#[instrument(skip(database_url))]
pub async fn init_db(database_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("configuring database connection pool");

    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(10)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(options).await?;
    info!("database connection established");

    Ok(db)
}
