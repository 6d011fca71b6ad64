use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::activity_log::{ActivityLog, ActivityLogEntry};
use crate::auth::{AccessContext, Permission, Role};
use crate::db::companies::find_company;
use crate::db::results::{NewResult, insert_result};
use crate::error::AppError;
use crate::models::{DbQuestion, Question, QuizQuestion};
use crate::quiz::{genre_tags, is_correct_answer, join_list, sample, shuffled, split_list, verdict};

pub(crate) const QUESTION_COLUMNS: &str = "SELECT q.id, q.creator_id, q.company_id, q.genre, q.title, q.choices, q.answer, q.explanation
     FROM questions q";

/// Editable content of a question. `company_id` is only honoured on create.
#[derive(Debug, Clone)]
pub struct QuestionFields {
    pub genre: String,
    pub title: String,
    pub choices: Vec<String>,
    pub answer: Vec<String>,
    pub explanation: String,
    pub company_id: Option<i64>,
}

impl QuestionFields {
    /// Every correct answer must be one of the choices.
    fn check(&self) -> Result<(), AppError> {
        let choices = split_list(&join_list(&self.choices));
        let answer = split_list(&join_list(&self.answer));

        if choices.is_empty() {
            return Err(AppError::Validation(
                "a question needs at least one choice".to_string(),
            ));
        }
        if answer.is_empty() {
            return Err(AppError::Validation(
                "a question needs at least one correct answer".to_string(),
            ));
        }
        if let Some(stray) = answer.iter().find(|item| !choices.contains(item)) {
            return Err(AppError::Validation(format!(
                "answer '{}' is not one of the choices",
                stray
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct QuizSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub questions: Vec<QuizQuestion>,
}

impl QuizSession {
    pub(crate) fn open(questions: Vec<QuizQuestion>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            questions,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub question_id: i64,
    pub user_answer: Vec<String>,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SubmitOutcome {
    pub result_id: i64,
    pub is_correct: bool,
    pub verdict: String,
    pub correct_answers: Vec<String>,
    pub explanation: String,
    pub elapsed_seconds: f64,
}

/// Questions the caller may see, ready for further `AND` clauses.
pub(crate) fn visible_questions(ctx: &AccessContext) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::<Sqlite>::new(QUESTION_COLUMNS);
    builder.push(" WHERE 1 = 1");
    ctx.question_scope()
        .push_predicate(&mut builder, "q.company_id");
    builder
}

/// Case-sensitive substring match on the raw genre column.
pub(crate) fn push_genre_filter(builder: &mut QueryBuilder<'static, Sqlite>, genre: &str) {
    builder
        .push(" AND instr(q.genre, ")
        .push_bind(genre.to_string())
        .push(") > 0");
}

async fn find_visible_question(
    pool: &SqlitePool,
    ctx: &AccessContext,
    id: i64,
) -> Result<Question, AppError> {
    let mut builder = visible_questions(ctx);
    builder.push(" AND q.id = ").push_bind(id);

    builder
        .build_query_as::<DbQuestion>()
        .fetch_optional(pool)
        .await?
        .map(Question::from)
        .ok_or_else(|| AppError::NotFound(format!("Question with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn list_questions(
    pool: &SqlitePool,
    ctx: &AccessContext,
    genre: Option<&str>,
) -> Result<Vec<Question>, AppError> {
    ctx.require_permission(Permission::ManageQuestions)?;
    info!("Listing questions");

    let mut builder = visible_questions(ctx);
    if let Some(genre) = genre.map(str::trim).filter(|genre| !genre.is_empty()) {
        push_genre_filter(&mut builder, genre);
    }
    builder.push(" ORDER BY q.id");

    let rows = builder.build_query_as::<DbQuestion>().fetch_all(pool).await?;

    Ok(rows.into_iter().map(Question::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_question(
    pool: &SqlitePool,
    ctx: &AccessContext,
    id: i64,
) -> Result<Question, AppError> {
    ctx.require_permission(Permission::ManageQuestions)?;
    info!("Fetching question");

    find_visible_question(pool, ctx, id).await
}

#[instrument(skip(pool, fields), fields(title = %fields.title))]
pub async fn create_question(
    pool: &SqlitePool,
    ctx: &AccessContext,
    fields: QuestionFields,
) -> Result<Question, AppError> {
    ctx.require_permission(Permission::ManageQuestions)?;
    info!("Creating question");

    let company_id = match ctx.role {
        Role::Master => {
            if let Some(company_id) = fields.company_id {
                find_company(pool, company_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Company with id {} not found", company_id))
                })?;
            }
            fields.company_id
        }
        _ => {
            let own = ctx.company_id.ok_or_else(|| {
                AppError::Authorization("admin is not assigned to a company".to_string())
            })?;
            if fields.company_id.is_some_and(|requested| requested != own) {
                return Err(AppError::Authorization(
                    "admins may only create questions for their own company".to_string(),
                ));
            }
            Some(own)
        }
    };

    fields.check()?;

    let res = sqlx::query(
        "INSERT INTO questions (creator_id, company_id, genre, title, choices, answer, explanation)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(ctx.user_id)
    .bind(company_id)
    .bind(fields.genre.trim())
    .bind(fields.title.trim())
    .bind(join_list(&fields.choices))
    .bind(join_list(&fields.answer))
    .bind(fields.explanation.trim())
    .execute(pool)
    .await?;

    find_visible_question(pool, ctx, res.last_insert_rowid()).await
}

#[instrument(skip(pool, fields))]
pub async fn update_question(
    pool: &SqlitePool,
    ctx: &AccessContext,
    id: i64,
    fields: QuestionFields,
) -> Result<Question, AppError> {
    ctx.require_permission(Permission::ManageQuestions)?;
    info!("Updating question");

    let existing = find_visible_question(pool, ctx, id).await?;
    if !ctx.can_mutate_question(existing.company_id) {
        return Err(AppError::Authorization(
            "question belongs to another owner".to_string(),
        ));
    }

    fields.check()?;

    sqlx::query(
        "UPDATE questions
         SET genre = ?, title = ?, choices = ?, answer = ?, explanation = ?
         WHERE id = ?",
    )
    .bind(fields.genre.trim())
    .bind(fields.title.trim())
    .bind(join_list(&fields.choices))
    .bind(join_list(&fields.answer))
    .bind(fields.explanation.trim())
    .bind(id)
    .execute(pool)
    .await?;

    find_visible_question(pool, ctx, id).await
}

#[instrument(skip(pool))]
pub async fn delete_question(
    pool: &SqlitePool,
    ctx: &AccessContext,
    id: i64,
) -> Result<(), AppError> {
    ctx.require_permission(Permission::ManageQuestions)?;
    info!("Deleting question");

    let existing = find_visible_question(pool, ctx, id).await?;
    if !ctx.can_mutate_question(existing.company_id) {
        return Err(AppError::Authorization(
            "question belongs to another owner".to_string(),
        ));
    }

    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// The shared bank: questions not owned by any company.
#[instrument(skip(pool))]
pub async fn common_questions(
    pool: &SqlitePool,
    ctx: &AccessContext,
) -> Result<Vec<Question>, AppError> {
    ctx.require_permission(Permission::ManageQuestions)?;
    info!("Listing common questions");

    let rows = sqlx::query_as::<_, DbQuestion>(&format!(
        "{} WHERE q.company_id IS NULL ORDER BY q.id",
        QUESTION_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Question::from).collect())
}

/// Duplicates a visible question into the caller's own company.
#[instrument(skip(pool))]
pub async fn copy_question(
    pool: &SqlitePool,
    ctx: &AccessContext,
    id: i64,
) -> Result<Question, AppError> {
    ctx.require_permission(Permission::ManageQuestions)?;
    info!("Copying question");

    let company_id = ctx.company_id.ok_or_else(|| {
        AppError::Authorization("caller is not assigned to a company".to_string())
    })?;
    let source = find_visible_question(pool, ctx, id).await?;

    let res = sqlx::query(
        "INSERT INTO questions (creator_id, company_id, genre, title, choices, answer, explanation)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(ctx.user_id)
    .bind(company_id)
    .bind(&source.genre)
    .bind(&source.title)
    .bind(&source.choices)
    .bind(&source.answer)
    .bind(&source.explanation)
    .execute(pool)
    .await?;

    let copy_id = res.last_insert_rowid();
    info!(source_id = id, copy_id, company_id, "Question copied");

    find_visible_question(pool, ctx, copy_id).await
}

/// Draws up to `count` distinct visible questions whose genre contains `genre`.
#[instrument(skip(pool))]
pub async fn start_quiz(
    pool: &SqlitePool,
    ctx: &AccessContext,
    genre: &str,
    count: usize,
) -> Result<QuizSession, AppError> {
    ctx.require_permission(Permission::TakeQuiz)?;

    let genre = genre.trim();
    if genre.is_empty() {
        return Err(AppError::Validation("genre is required".to_string()));
    }
    if count == 0 {
        return Err(AppError::Validation("count must be at least 1".to_string()));
    }
    info!("Starting quiz");

    let mut builder = visible_questions(ctx);
    push_genre_filter(&mut builder, genre);

    let matching: Vec<Question> = builder
        .build_query_as::<DbQuestion>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Question::from)
        .collect();

    if matching.is_empty() {
        return Err(AppError::NotFound(format!(
            "No questions found for genre '{}'",
            genre
        )));
    }

    let questions = sample(matching, count)
        .iter()
        .map(QuizQuestion::from)
        .collect();

    Ok(QuizSession::open(questions))
}

#[instrument(skip(pool))]
pub async fn retry_question(
    pool: &SqlitePool,
    ctx: &AccessContext,
    id: i64,
) -> Result<QuizSession, AppError> {
    ctx.require_permission(Permission::TakeQuiz)?;
    info!("Retrying question");

    let question = find_visible_question(pool, ctx, id).await?;
    let mut quiz_question = QuizQuestion::from(&question);
    quiz_question.choices = shuffled(quiz_question.choices);

    Ok(QuizSession::open(vec![quiz_question]))
}

/// Scores an answer and records it twice: durably in `results`, then as a
/// best-effort line in the activity log.
#[instrument(skip(pool, log, submission), fields(question_id = submission.question_id))]
pub async fn submit_answer(
    pool: &SqlitePool,
    log: &ActivityLog,
    ctx: &AccessContext,
    submission: Submission,
) -> Result<SubmitOutcome, AppError> {
    ctx.require_permission(Permission::TakeQuiz)?;
    info!("Submitting answer");

    let question = find_visible_question(pool, ctx, submission.question_id).await?;
    let correct_answers = question.answer_list();
    let is_correct = is_correct_answer(&submission.user_answer, &question.answer);
    let verdict = verdict(is_correct, &correct_answers);

    let end_time = Utc::now();
    let start_time = submission
        .started_at
        .filter(|started| *started <= end_time)
        .unwrap_or(end_time);
    let elapsed_seconds = (end_time - start_time).num_milliseconds().max(0) as f64 / 1000.0;
    let session_id = submission
        .session_id
        .filter(|session| !session.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut conn = pool.acquire().await?;
    let result_id = insert_result(
        &mut conn,
        &NewResult {
            user_id: ctx.user_id,
            question_id: question.id,
            session_id: &session_id,
            user_answer: &submission.user_answer,
            is_correct,
            answered_at: end_time.naive_utc(),
        },
    )
    .await?;
    drop(conn);

    let entry = ActivityLogEntry {
        date: end_time.date_naive(),
        name: ctx.username.clone(),
        genre: question.genre.clone(),
        question_id: question.id,
        question_title: question.title.clone(),
        start_time,
        end_time,
        elapsed_seconds,
        user_choice: submission.user_answer.clone(),
        correct_answers: correct_answers.clone(),
        result: verdict.clone(),
        explanation: question.explanation.clone(),
    };
    if let Err(err) = log.append(&entry).await {
        warn!(error = %err, result_id, "Activity log append failed; result is still recorded");
    }

    Ok(SubmitOutcome {
        result_id,
        is_correct,
        verdict,
        correct_answers,
        explanation: question.explanation,
        elapsed_seconds,
    })
}

/// Genre tag -> ids of the visible questions carrying it.
#[instrument(skip(pool))]
pub async fn genres(
    pool: &SqlitePool,
    ctx: &AccessContext,
) -> Result<BTreeMap<String, Vec<i64>>, AppError> {
    ctx.require_permission(Permission::TakeQuiz)?;
    info!("Building genre index");

    let mut builder = visible_questions(ctx);
    builder.push(" ORDER BY q.id");
    let rows = builder.build_query_as::<DbQuestion>().fetch_all(pool).await?;

    let mut index: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for question in rows.into_iter().map(Question::from) {
        for tag in genre_tags(&question.genre) {
            index.entry(tag).or_default().push(question.id);
        }
    }

    Ok(index)
}
