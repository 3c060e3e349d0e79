// src/models/role.rs

use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'roles' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id: i32,
    pub name: String,
    /// Raw permission bit-set granted by this role.
    pub permissions: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A role joined with the user it is assigned to.
#[derive(Debug, Clone, FromRow)]
pub struct UserRoleRow {
    pub user_id: i32,
    pub id: i32,
    pub name: String,
    pub permissions: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserRoleRow> for Role {
    fn from(row: UserRoleRow) -> Self {
        Role {
            id: row.id,
            name: row.name,
            permissions: row.permissions,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Role entry for the user edit view, flagged when the user holds it.
#[derive(Debug, Serialize)]
pub struct RoleWithSelected {
    #[serde(flatten)]
    pub role: Role,
    pub selected: bool,
}

/// Permission bit-set carried by a session.
///
/// A user's permissions are the bitwise OR of the permissions of all their roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(i64);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const MANAGE_NEWS: Permissions = Permissions(1 << 0);
    pub const VIEW_ACTIONS: Permissions = Permissions(1 << 1);
    pub const MANAGE_USERS: Permissions = Permissions(1 << 2);
    pub const MANAGE_QUIZZES: Permissions = Permissions(1 << 3);
    pub const ALL: Permissions = Permissions(
        Self::MANAGE_NEWS.0 | Self::VIEW_ACTIONS.0 | Self::MANAGE_USERS.0 | Self::MANAGE_QUIZZES.0,
    );

    pub const fn from_bits(bits: i64) -> Self {
        Permissions(bits)
    }

    pub const fn bits(self) -> i64 {
        self.0
    }

    /// True when every bit of `required` is set.
    pub const fn contains(self, required: Permissions) -> bool {
        self.0 & required.0 == required.0
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}
