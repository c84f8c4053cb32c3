// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        quiz::{CreateQuizRequest, PublicQuestion, Question, Quiz, QuizSummary, TakeQuizRequest, TakeQuizResponse},
        submission::{Answer, LeaderboardEntry, SubmitQuizRequest},
        user::Role,
    },
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_attempt_token, verify_attempt_token},
    },
};

/// Extra seconds past the nominal duration during which a submission is
/// still accepted, covering client clock skew and upload time.
const ATTEMPT_GRACE_SECONDS: u64 = 30;

/// Creates a new quiz. Teachers and admins only.
///
/// The access password is hashed with Argon2 before storage; question ids
/// are assigned 1..n in request order and are stable for the quiz's lifetime.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if claims.role == Role::Student {
        return Err(AppError::Forbidden(
            "Only teachers can create quizzes".to_string(),
        ));
    }

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let questions: Vec<Question> = payload
        .questions
        .into_iter()
        .enumerate()
        .map(|(i, q)| Question {
            id: (i + 1) as i64,
            text: q.text.trim().to_string(),
            options: q.options,
            correct_answer: q.correct_answer,
        })
        .collect();

    let hashed_password = hash_password(&payload.password)?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO quizzes (title, duration_seconds, password, created_by, questions)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(payload.title.trim())
    .bind(payload.duration_seconds)
    .bind(&hashed_password)
    .bind(claims.user_id())
    .bind(SqlJson(&questions))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": id,
            "message": "Quiz created successfully"
        })),
    ))
}

/// Lists all quizzes as summaries. Public.
///
/// Questions and passwords never appear here; takers must go through the
/// password-gated fetch.
pub async fn list_quizzes(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let quizzes = sqlx::query_as::<_, QuizSummary>(
        r#"
        SELECT
            id, title, duration_seconds,
            jsonb_array_length(questions)::BIGINT AS question_count,
            created_by, created_at
        FROM quizzes
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list quizzes: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(quizzes))
}

/// Password-gated quiz fetch: starts one timed attempt.
///
/// On a matching password, returns the questions without their correct
/// answers plus an attempt token whose expiry is the quiz duration (with a
/// short grace period). A wrong password yields 401 and no question content.
pub async fn take_quiz(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<TakeQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, quiz_id).await?;

    let is_valid = verify_password(&payload.password, &quiz.password)?;
    if !is_valid {
        return Err(AppError::AuthError("Invalid quiz password".to_string()));
    }

    let window = quiz.duration_seconds as u64 + ATTEMPT_GRACE_SECONDS;
    let attempt_token = sign_attempt_token(claims.user_id(), quiz.id, &config.jwt_secret, window)?;

    let questions: Vec<PublicQuestion> = quiz.questions.0.iter().map(PublicQuestion::from).collect();

    Ok(Json(TakeQuizResponse {
        id: quiz.id,
        title: quiz.title,
        duration_seconds: quiz.duration_seconds,
        questions,
        attempt_token,
        expires_in: window,
    }))
}

/// Submits a quiz attempt and records the score.
///
/// * The attempt token must verify, belong to the caller, reference the
///   submitted quiz, and be unexpired (server-side time limit).
/// * Every answer must reference a real question id of the quiz; an unknown
///   id rejects the whole submission and nothing is persisted.
/// * Score is the count of answers matching the stored correct answer.
/// * The submission row is written first, then the student's last_score is
///   updated; there is no cross-row transaction.
pub async fn submit_quiz(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.answers.is_empty() {
        return Err(AppError::BadRequest("No answers submitted".to_string()));
    }

    let attempt = verify_attempt_token(&req.attempt_token, &config.jwt_secret)?;
    if attempt.quiz_id != req.quiz_id {
        return Err(AppError::BadRequest(
            "Attempt token does not match this quiz".to_string(),
        ));
    }
    if attempt.sub != claims.sub {
        return Err(AppError::AuthError(
            "Attempt token belongs to another user".to_string(),
        ));
    }

    let quiz = fetch_quiz(&pool, req.quiz_id).await?;

    let score = score_answers(&quiz.questions.0, &req.answers)?;

    let student_id = claims.user_id();

    let submission_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO submissions (student_id, quiz_id, answers, score)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(quiz.id)
    .bind(SqlJson(&req.answers))
    .bind(score)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to insert submission: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    // Last score only, not best or average. A crash between the insert
    // above and this update leaves the leaderboard one submission behind.
    sqlx::query("UPDATE users SET last_score = $1 WHERE id = $2")
        .bind(score)
        .bind(student_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update last_score: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(serde_json::json!({
        "score": score,
        "total_questions": quiz.questions.0.len(),
        "submission_id": submission_id,
        "message": "Quiz submitted successfully"
    })))
}

/// Retrieves the top 10 users by most recent score. Public.
///
/// Users who never submitted (last_score IS NULL) do not appear.
/// Recomputed on every read, no caching.
pub async fn get_leaderboard(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let leaderboard = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT name, last_score
        FROM users
        WHERE last_score IS NOT NULL
        ORDER BY last_score DESC
        LIMIT 10
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch leaderboard: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(leaderboard))
}

async fn fetch_quiz(pool: &PgPool, quiz_id: i64) -> Result<Quiz, AppError> {
    sqlx::query_as::<_, Quiz>(
        r#"
        SELECT id, title, duration_seconds, password, created_by, questions, created_at
        FROM quizzes
        WHERE id = $1
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Matches submitted answers against the quiz's questions.
///
/// Returns the count of answers whose selected option equals the
/// referenced question's correct answer, or an error naming the first
/// answer that references an unknown question id.
fn score_answers(questions: &[Question], answers: &[Answer]) -> Result<i64, AppError> {
    let mut score = 0;

    for answer in answers {
        let question = questions
            .iter()
            .find(|q| q.id == answer.question_id)
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Question not found for id: {}",
                    answer.question_id
                ))
            })?;

        if question.correct_answer == answer.selected_option {
            score += 1;
        }
    }

    Ok(score)
}
