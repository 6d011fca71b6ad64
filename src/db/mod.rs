pub mod analytics;
pub mod companies;
pub mod questions;
pub mod results;
pub mod users;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, instrument};

use crate::error::AppError;

#[instrument]
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    info!("Connecting to database");
    let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Migrations completed successfully");
    Ok(())
}
