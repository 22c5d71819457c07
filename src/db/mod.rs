//! Database layer: pool and PostgreSQL-backed stores.

mod pool;
mod repositories;

pub use pool::{create_pool, DbPool};
pub use repositories::{PgIdentityStore, PgPresenceStore};
