use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::auth::{AccessContext, Permission};
use crate::db::questions::{QUESTION_COLUMNS, QuizSession, push_genre_filter, visible_questions};
use crate::db::results::answer_history;
use crate::diagnosis::{Diagnosis, diagnose};
use crate::error::AppError;
use crate::models::{DbQuestion, Question, QuizQuestion};
use crate::quiz::{accuracy, sample};

/// How far back "recent" mistakes reach.
pub const REVIEW_WINDOW_DAYS: i64 = 7;

/// Largest review or weak-point set handed out at once.
pub const PRACTICE_SET_SIZE: usize = 10;

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenreCount {
    pub correct: i64,
    pub total: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Dashboard {
    /// Genre -> accuracy percentage, one decimal.
    pub genre_stats: BTreeMap<String, f64>,
    pub genre_counts: BTreeMap<String, GenreCount>,
    pub review_count: i64,
}

fn review_cutoff() -> NaiveDateTime {
    (Utc::now() - Duration::days(REVIEW_WINDOW_DAYS)).naive_utc()
}

#[instrument(skip(pool))]
pub async fn dashboard(pool: &SqlitePool, ctx: &AccessContext) -> Result<Dashboard, AppError> {
    ctx.require_permission(Permission::ViewOwnResults)?;
    info!("Building dashboard");

    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        "SELECT q.genre, SUM(CASE WHEN r.is_correct THEN 1 ELSE 0 END), COUNT(*)
         FROM results r
         JOIN questions q ON q.id = r.question_id
         WHERE r.user_id = ?
         GROUP BY q.genre
         ORDER BY q.genre",
    )
    .bind(ctx.user_id)
    .fetch_all(pool)
    .await?;

    // Counts only what the review set can actually serve.
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(DISTINCT r.question_id)
         FROM results r
         JOIN questions q ON q.id = r.question_id
         WHERE r.is_correct = 0 AND r.user_id = ",
    );
    builder
        .push_bind(ctx.user_id)
        .push(" AND r.answered_at >= ")
        .push_bind(review_cutoff());
    ctx.question_scope()
        .push_predicate(&mut builder, "q.company_id");
    let (review_count,) = builder.build_query_as::<(i64,)>().fetch_one(pool).await?;

    let mut dashboard = Dashboard {
        genre_stats: BTreeMap::new(),
        genre_counts: BTreeMap::new(),
        review_count,
    };
    for (genre, correct, total) in rows {
        dashboard
            .genre_stats
            .insert(genre.clone(), accuracy(correct, total));
        dashboard
            .genre_counts
            .insert(genre, GenreCount { correct, total });
    }

    Ok(dashboard)
}

/// Visible questions the caller got wrong, optionally only since `since`.
async fn missed_questions(
    pool: &SqlitePool,
    ctx: &AccessContext,
    since: Option<NaiveDateTime>,
) -> Result<Vec<Question>, AppError> {
    let mut builder = visible_questions(ctx);
    builder
        .push(" AND q.id IN (SELECT r.question_id FROM results r WHERE r.is_correct = 0 AND r.user_id = ")
        .push_bind(ctx.user_id);
    if let Some(since) = since {
        builder.push(" AND r.answered_at >= ").push_bind(since);
    }
    builder.push(")");

    let rows = builder.build_query_as::<DbQuestion>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Question::from).collect())
}

fn practice_set(questions: Vec<Question>, empty_message: &str) -> Result<QuizSession, AppError> {
    if questions.is_empty() {
        return Err(AppError::NotFound(empty_message.to_string()));
    }

    let picked = sample(questions, PRACTICE_SET_SIZE)
        .iter()
        .map(QuizQuestion::from)
        .collect();
    Ok(QuizSession::open(picked))
}

/// Up to ten questions answered incorrectly in the last week.
#[instrument(skip(pool))]
pub async fn review_set(pool: &SqlitePool, ctx: &AccessContext) -> Result<QuizSession, AppError> {
    ctx.require_permission(Permission::TakeQuiz)?;
    info!("Selecting review set");

    let missed = missed_questions(pool, ctx, Some(review_cutoff())).await?;
    practice_set(missed, "No questions to review")
}

/// Up to ten questions ever answered incorrectly.
#[instrument(skip(pool))]
pub async fn weak_set(pool: &SqlitePool, ctx: &AccessContext) -> Result<QuizSession, AppError> {
    ctx.require_permission(Permission::TakeQuiz)?;
    info!("Selecting weak-point set");

    let missed = missed_questions(pool, ctx, None).await?;
    practice_set(missed, "No weak questions found")
}

/// Easiest questions first, by accuracy across every user. Questions nobody
/// has attempted count as 0% and so come last.
#[instrument(skip(pool))]
pub async fn warmup_set(
    pool: &SqlitePool,
    ctx: &AccessContext,
    genre: Option<&str>,
    count: usize,
) -> Result<QuizSession, AppError> {
    ctx.require_permission(Permission::TakeQuiz)?;
    if count == 0 {
        return Err(AppError::Validation("count must be at least 1".to_string()));
    }
    info!("Selecting warmup set");

    let mut builder = QueryBuilder::<Sqlite>::new(QUESTION_COLUMNS);
    builder.push(" LEFT JOIN results r ON r.question_id = q.id WHERE 1 = 1");
    ctx.question_scope()
        .push_predicate(&mut builder, "q.company_id");
    if let Some(genre) = genre.map(str::trim).filter(|genre| !genre.is_empty()) {
        push_genre_filter(&mut builder, genre);
    }
    builder
        .push(" GROUP BY q.id ORDER BY COALESCE(AVG(r.is_correct), 0.0) DESC, q.id ASC LIMIT ")
        .push_bind(i64::try_from(count).unwrap_or(i64::MAX));

    let questions: Vec<QuizQuestion> = builder
        .build_query_as::<DbQuestion>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Question::from)
        .map(|question| QuizQuestion::from(&question))
        .collect();

    if questions.is_empty() {
        return Err(AppError::NotFound(
            "No questions available for warmup".to_string(),
        ));
    }

    Ok(QuizSession::open(questions))
}

#[instrument(skip(pool))]
pub async fn analysis(pool: &SqlitePool, ctx: &AccessContext) -> Result<Diagnosis, AppError> {
    ctx.require_permission(Permission::ViewOwnResults)?;
    info!("Diagnosing learning pattern");

    let history = answer_history(pool, ctx.user_id).await?;
    Ok(diagnose(
        history
            .iter()
            .map(|record| (record.genre.as_str(), record.is_correct)),
    ))
}
