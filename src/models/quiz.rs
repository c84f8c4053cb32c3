// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::{Validate, ValidationError};

/// One multiple-choice question stored inside a quiz's `questions` JSONB
/// column. Ids are assigned 1..n at quiz creation and never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// DTO for a question as sent to quiz takers. Excludes the correct answer.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
        }
    }
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    pub title: String,

    /// Time limit for one attempt, in seconds.
    pub duration_seconds: i64,

    /// Argon2 hash of the quiz access password.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// Id of the teacher who authored the quiz.
    pub created_by: i64,

    /// Ordered question subdocuments, stored as a JSON array.
    pub questions: Json<Vec<Question>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Listing row for `GET /api/quizzes`. Never carries questions or password.
#[derive(Debug, Serialize, FromRow)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub duration_seconds: i64,
    pub question_count: i64,
    pub created_by: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for one question in a quiz creation request.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = validate_correct_answer))]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 500, message = "Question text is required."))]
    #[validate(custom(function = validate_not_blank))]
    pub text: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 500, message = "Correct answer is required."))]
    pub correct_answer: String,
}

/// DTO for creating a new quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required."))]
    #[validate(custom(function = validate_not_blank))]
    pub title: String,
    #[validate(range(min = 10, max = 86400, message = "Duration must be between 10s and 24h."))]
    pub duration_seconds: i64,
    #[validate(length(min = 4, max = 128, message = "Quiz password must be at least 4 characters."))]
    pub password: String,
    #[validate(length(min = 1, message = "Questions are required."))]
    #[validate(nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

/// DTO for the password-gated quiz fetch.
#[derive(Debug, Deserialize)]
pub struct TakeQuizRequest {
    pub password: String,
}

/// Quiz content handed to a taker after a successful password check,
/// together with the attempt token that bounds the submission window.
#[derive(Debug, Serialize)]
pub struct TakeQuizResponse {
    pub id: i64,
    pub title: String,
    pub duration_seconds: i64,
    pub questions: Vec<PublicQuestion>,
    pub attempt_token: String,
    /// Seconds until the attempt token expires.
    pub expires_in: u64,
}

// Whitespace-only values pass `length` checks but are trimmed to "" at
// storage time, so they are rejected here on the trimmed value.
fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn validate_options(options: &[String]) -> Result<(), ValidationError> {
    if options.len() < 2 {
        return Err(ValidationError::new("at_least_two_options"));
    }
    for opt in options {
        if opt.trim().is_empty() || opt.len() > 500 {
            return Err(ValidationError::new("invalid_option"));
        }
    }
    Ok(())
}

fn validate_correct_answer(q: &CreateQuestionRequest) -> Result<(), ValidationError> {
    if !q.options.contains(&q.correct_answer) {
        return Err(ValidationError::new("correct_answer_not_in_options"));
    }
    Ok(())
}
