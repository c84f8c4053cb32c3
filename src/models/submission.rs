// src/models/submission.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

/// One recorded answer inside a submission's `answers` JSONB column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: i64,
    pub selected_option: String,
}

/// Represents the 'submissions' table in the database.
/// One row per submit action, never updated afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub student_id: i64,
    pub quiz_id: i64,
    pub answers: Json<Vec<Answer>>,
    pub score: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    pub quiz_id: i64,

    /// The token received from the password-gated quiz fetch. Bounds the
    /// attempt to the quiz duration server-side.
    pub attempt_token: String,

    pub answers: Vec<Answer>,
}

/// Aggregated row for displaying the leaderboard.
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub name: String,
    pub last_score: i64,
}
