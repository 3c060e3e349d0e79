// src/handlers/users.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        role::{Role, RoleWithSelected, UserRoleRow},
        user::{UpdateUserRequest, User, UserEditResponse, UserWithRoles},
    },
    utils::{audit::record_action, jwt::Session},
};

async fn fetch_roles(pool: &PgPool) -> Result<Vec<Role>, AppError> {
    sqlx::query_as::<_, Role>(
        "SELECT id, name, permissions, created_at, updated_at FROM roles ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list roles: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })
}

async fn fetch_user_with_roles(pool: &PgPool, id: i32) -> Result<UserWithRoles, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    let roles = sqlx::query_as::<_, Role>(
        r#"
        SELECT r.id, r.name, r.permissions, r.created_at, r.updated_at
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = $1
        ORDER BY r.id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(UserWithRoles { user, roles })
}

/// Lists all users with their roles.
/// Requires: MANAGE_USERS.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, created_at, updated_at FROM users ORDER BY id",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let rows = sqlx::query_as::<_, UserRoleRow>(
        r#"
        SELECT ur.user_id, r.id, r.name, r.permissions, r.created_at, r.updated_at
        FROM user_roles ur
        JOIN roles r ON r.id = ur.role_id
        ORDER BY r.id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let mut roles_by_user: HashMap<i32, Vec<Role>> = HashMap::new();
    for row in rows {
        roles_by_user.entry(row.user_id).or_default().push(row.into());
    }

    let users: Vec<UserWithRoles> = users
        .into_iter()
        .map(|user| {
            let roles = roles_by_user.remove(&user.id).unwrap_or_default();
            UserWithRoles { user, roles }
        })
        .collect();

    Ok(Json(users))
}

/// A user with every role, flagged where assigned.
/// Requires: MANAGE_USERS.
pub async fn get_user(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let user = fetch_user_with_roles(&pool, id).await?;

    let roles = fetch_roles(&pool)
        .await?
        .into_iter()
        .map(|role| {
            let selected = user.roles.iter().any(|held| held.id == role.id);
            RoleWithSelected { role, selected }
        })
        .collect();

    Ok(Json(UserEditResponse { user, roles }))
}

/// Renames a user and replaces their roles in one transaction.
/// Requires: MANAGE_USERS.
pub async fn update_user(
    State(pool): State<PgPool>,
    Extension(session): Extension<Session>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    sqlx::query("UPDATE users SET username = $1, updated_at = NOW() WHERE id = $2 RETURNING id")
        .bind(&payload.username)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                AppError::Conflict(format!("Username '{}' already exists", payload.username))
            } else {
                AppError::InternalServerError(e.to_string())
            }
        })?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    if !payload.role_ids.is_empty() {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO user_roles (user_id, role_id) ");
        builder.push_values(&payload.role_ids, |mut row, role_id| {
            row.push_bind(id).push_bind(*role_id);
        });
        builder.push(" ON CONFLICT DO NOTHING");

        builder.build().execute(&mut *tx).await.map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_foreign_key_violation())
            {
                AppError::BadRequest("Unknown role".to_string())
            } else {
                tracing::error!("Failed to assign roles: {:?}", e);
                AppError::InternalServerError(e.to_string())
            }
        })?;
    }

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    record_action(&pool, Some(session.user_id), format!("Edited user {}", id));

    Ok(Json(fetch_user_with_roles(&pool, id).await?))
}

/// Deletes a user by ID. Self-deletion is refused.
/// Requires: MANAGE_USERS.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(session): Extension<Session>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    if id == session.user_id {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    record_action(&pool, Some(session.user_id), format!("Deleted user {}", id));

    Ok(StatusCode::NO_CONTENT)
}

/// Lists all roles.
/// Requires: MANAGE_USERS.
pub async fn list_roles(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_roles(&pool).await?))
}
