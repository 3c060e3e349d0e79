// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::role::{Role, RoleWithSelected};

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i32,

    /// Unique display name.
    pub username: String,

    /// Unique login e-mail.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password_hash: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A user together with the roles assigned to them.
#[derive(Debug, Serialize)]
pub struct UserWithRoles {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<Role>,
}

/// Data for the user edit form: the user and every role, flagged when assigned.
#[derive(Debug, Serialize)]
pub struct UserEditResponse {
    pub user: UserWithRoles,
    pub roles: Vec<RoleWithSelected>,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 5,
        max = 100,
        message = "Username must be between 5 and 100 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 4,
        max = 200,
        message = "Email must be between 4 and 200 characters."
    ))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 72,
        message = "Password must be between 8 and 72 characters."
    ))]
    pub password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 4, max = 200))]
    pub email: String,
    #[validate(length(min = 8, max = 72))]
    pub password: String,
}

/// DTO for the administrative user edit.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 5, max = 100, message = "invalid username"))]
    pub username: String,
    #[serde(default)]
    pub role_ids: Vec<i32>,
}
