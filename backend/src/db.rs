use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Build the connection pool and run pending migrations.
///
/// Failing here means the store is unreachable at startup, which the runner
/// treats as fatal.
pub fn init_pool(database_url: &str) -> Result<DbPool, String> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .connection_timeout(Duration::from_secs(10))
        .build(manager)
        .map_err(|e| format!("Failed to create database pool: {}", e))?;

    // Run pending migrations automatically
    let mut conn = pool
        .get()
        .map_err(|e| format!("Failed to get database connection: {}", e))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| format!("Failed to run database migrations: {}", e))?;

    log::info!("Database migrations completed successfully");

    Ok(pool)
}
