use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;

use crate::error::{StoreError, StoreResult};

pub mod schema;

// An alias to the type for a pool of Diesel Postgres connections.
pub type Pool = diesel::r2d2::Pool<ConnectionManager<PgConnection>>;

/// A single connection checked out of the pool.
pub type DbConnection = diesel::r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Builds a connection pool for the given database URL.
///
/// The pool is the only piece of shared state in this crate; callers construct
/// it once and hand a clone to each store.
pub fn connect(database_url: &str) -> StoreResult<Pool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder().build(manager)?;
    log::debug!("database pool ready");
    Ok(pool)
}

/// Builds a connection pool from the `DATABASE_URL` environment variable,
/// loading a `.env` file if one is present.
pub fn connect_from_env() -> StoreResult<Pool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| StoreError::Config("DATABASE_URL is not set".into()))?;
    connect(&database_url)
}
