use chrono::NaiveDateTime;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use crate::auth::{AccessContext, Permission};
use crate::error::AppError;
use crate::models::{AdminResult, DbAdminResult, DbMyResult, MyResult};

/// One answered question, in the order the user answered it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnswerRecord {
    pub question_id: i64,
    pub genre: String,
    pub is_correct: bool,
    pub answered_at: NaiveDateTime,
}

pub struct NewResult<'a> {
    pub user_id: i64,
    pub question_id: i64,
    pub session_id: &'a str,
    pub user_answer: &'a [String],
    pub is_correct: bool,
    pub answered_at: NaiveDateTime,
}

pub(crate) async fn insert_result(
    conn: &mut SqliteConnection,
    result: &NewResult<'_>,
) -> Result<i64, AppError> {
    let user_answer = serde_json::to_string(result.user_answer)?;

    let res = sqlx::query(
        "INSERT INTO results (user_id, question_id, session_id, user_answer, is_correct, answered_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(result.user_id)
    .bind(result.question_id)
    .bind(result.session_id)
    .bind(user_answer)
    .bind(result.is_correct)
    .bind(result.answered_at)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn my_results(pool: &SqlitePool, ctx: &AccessContext) -> Result<Vec<MyResult>, AppError> {
    ctx.require_permission(Permission::ViewOwnResults)?;
    info!("Listing caller results");

    let rows = sqlx::query_as::<_, DbMyResult>(
        "SELECT r.id, r.question_id, q.title AS question_title, q.genre, r.session_id,
                r.user_answer, r.is_correct, r.answered_at
         FROM results r
         JOIN questions q ON q.id = r.question_id
         WHERE r.user_id = ?
         ORDER BY r.answered_at DESC, r.id DESC",
    )
    .bind(ctx.user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MyResult::from).collect())
}

/// Results joined to user and company. Masters see everything, admins only
/// their own tenant.
#[instrument(skip(pool))]
pub async fn admin_results(
    pool: &SqlitePool,
    ctx: &AccessContext,
) -> Result<Vec<AdminResult>, AppError> {
    ctx.require_permission(Permission::ViewTenantResults)?;
    info!("Listing tenant results");

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT r.id, r.user_id, u.username, u.company_id, c.name AS company_name,
                r.question_id, q.title AS question_title, q.genre, r.is_correct, r.answered_at
         FROM results r
         JOIN users u ON u.id = r.user_id
         LEFT JOIN companies c ON c.id = u.company_id
         LEFT JOIN questions q ON q.id = r.question_id
         WHERE 1 = 1",
    );
    ctx.tenant_scope()
        .push_predicate(&mut builder, "u.company_id", "r.user_id");
    builder.push(" ORDER BY r.answered_at DESC, r.id DESC");

    let rows = builder
        .build_query_as::<DbAdminResult>()
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(AdminResult::from).collect())
}

/// Every answer `user_id` has given to a question that still exists, oldest first.
pub(crate) async fn answer_history(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<AnswerRecord>, AppError> {
    let rows = sqlx::query_as::<_, AnswerRecord>(
        "SELECT r.question_id, q.genre, r.is_correct, r.answered_at
         FROM results r
         JOIN questions q ON q.id = r.question_id
         WHERE r.user_id = ?
         ORDER BY r.answered_at ASC, r.id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
