// src/models/verification_code.rs

use serde::Deserialize;
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'verification_codes' table: a pending registration keyed
/// by email, holding the data to create the user once the mailed code is
/// confirmed. Rows expire 10 minutes after (re)creation.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationCode {
    pub email: String,
    pub code: String,
    pub name: String,
    /// Argon2 hash of the pending password.
    pub password: String,
    pub role: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for requesting a verification code.
#[derive(Debug, Deserialize, Validate)]
pub struct SendCodeRequest {
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
    pub role: Option<String>,
}

/// DTO for completing a pending registration.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyAndRegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits."))]
    pub code: String,
}
