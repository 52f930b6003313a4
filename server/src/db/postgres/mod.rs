//! PostgreSQL implementation of the repository traits.

use sqlx::PgPool;

use crate::utils::AppError;

mod catalog;
mod events;
mod users;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const UNIQUE_VIOLATION: &str = "23505";

/// Turns a unique-constraint violation into a conflict, leaving every other
/// database error as is.
fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    let unique = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if unique {
        AppError::Conflict(message.to_string())
    } else {
        AppError::DatabaseError(err)
    }
}
