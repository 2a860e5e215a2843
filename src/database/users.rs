// ABOUTME: User management database operations
// ABOUTME: Handles user registration lookups for authentication
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Orion Engineering Assistant

use sqlx::sqlite::SqliteRow;
use sqlx::{Error as SqlxError, Row, SqlitePool};
use uuid::Uuid;

use super::now_timestamp;
use crate::errors::{AppError, AppResult};
use crate::models::{UserRecord, UserRole};

/// User database operations manager
#[derive(Clone)]
pub struct UserManager {
    pool: SqlitePool,
}

impl UserManager {
    /// Create a new user manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new user
    ///
    /// # Errors
    ///
    /// Returns `ResourceAlreadyExists` when the username or email is taken,
    /// or a database error
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> AppResult<UserRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            r"
            INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ",
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            SqlxError::Database(db) if db.is_unique_violation() => {
                AppError::already_exists("Username or email is already registered")
            }
            other => AppError::database(format!("Failed to create user: {other}")).with_source(other),
        })?;

        Ok(UserRecord {
            id,
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
            role,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Look up a user by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, username, email, password_hash, role, created_at, updated_at
            FROM users WHERE id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get user: {e}")).with_source(e))?;

        row.as_ref().map(row_to_user).transpose()
    }

    /// Look up a user by login name
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_user_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, username, email, password_hash, role, created_at, updated_at
            FROM users WHERE username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get user: {e}")).with_source(e))?;

        row.as_ref().map(row_to_user).transpose()
    }
}

fn row_to_user(row: &SqliteRow) -> AppResult<UserRecord> {
    let role: String = row.get("role");
    Ok(UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse().map_err(AppError::database)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
