use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::errors::AppResult;

pub mod row_parsers;

/// Connect to `database_url`, creating the file if needed, and apply migrations.
pub async fn init(database_url: &str) -> AppResult<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)?
		.create_if_missing(true)
		.foreign_keys(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect_with(options)
		.await?;

	migrate(&pool).await?;
	tracing::debug!(database_url, "identity store ready");

	Ok(pool)
}

/// A migrated in-memory database. Limited to one connection that never expires,
/// since every SQLite memory connection is its own database.
pub async fn memory_pool() -> AppResult<SqlitePool> {
	let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.min_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect_with(options)
		.await?;

	migrate(&pool).await?;
	Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> AppResult<()> {
	sqlx::migrate!().run(pool).await?;
	Ok(())
}
