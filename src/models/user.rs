// src/models/user.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Access level attached to every account.
///
/// Stored as lowercase TEXT in the database and carried verbatim in JWT claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    /// Next role up the ladder, used by the admin promote endpoint.
    pub fn promoted(&self) -> Option<Role> {
        match self {
            Role::Student => Some(Role::Teacher),
            Role::Teacher => Some(Role::Admin),
            Role::Admin => None,
        }
    }

    /// Next role down the ladder, used by the admin demote endpoint.
    pub fn demoted(&self) -> Option<Role> {
        match self {
            Role::Admin => Some(Role::Teacher),
            Role::Teacher => Some(Role::Student),
            Role::Student => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            _ => Err(()),
        }
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    pub name: String,

    /// Unique email, stored lowercase.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// User role: 'admin', 'teacher' or 'student'.
    pub role: String,

    /// Score of the most recent quiz submission. NULL until the user
    /// submits for the first time.
    pub last_score: Option<i64>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_str(&self.role).unwrap_or(Role::Student)
    }
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required."))]
    pub name: String,
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    /// Optional role, defaults to 'student'. 'admin' is rejected here;
    /// admins are seeded or promoted, never self-registered.
    pub role: Option<String>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for exchanging a refresh token for a new access token.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// DTO for admin user updates. Fields are optional and only validated
/// when present.
#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required."))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format."))]
    pub email: Option<String>,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: Option<String>,
}

/// DTO for mailing-list signups.
#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
}
