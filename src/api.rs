use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::SqlitePool;
use validator::Validate;

use crate::activity_log::{self, ActivityLog, ActivityLogEntry, ActivitySummary};
use crate::auth::{AccessContext, Role, TokenSigner, User};
use crate::db::analytics::{self, Dashboard};
use crate::db::companies::{self, RegisteredCompany};
use crate::db::questions::{self, QuestionFields, QuizSession, SubmitOutcome, Submission};
use crate::db::results;
use crate::db::users::{self, LoginOutcome, NewUser};
use crate::diagnosis::Diagnosis;
use crate::error::AppError;
use crate::models::{AdminResult, Company, MyResult, Question};
use crate::validation::{JsonValidateExt, USERNAME_PATTERN, not_blank};

const DEFAULT_WARMUP_COUNT: u32 = 10;

#[derive(Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(
        length(min = 1, max = 64, message = "must be between 1 and 64 characters"),
        regex(path = *USERNAME_PATTERN, message = "may only contain letters, digits and _.@-")
    )]
    username: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    password: String,
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = not_blank))]
    username: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    password: String,
}

#[derive(Deserialize, Validate)]
pub struct QuestionRequest {
    #[validate(custom(function = not_blank))]
    genre: String,
    #[validate(custom(function = not_blank))]
    title: String,
    #[validate(length(min = 1, message = "at least one choice is required"))]
    choices: Vec<String>,
    #[validate(length(min = 1, message = "at least one correct answer is required"))]
    answer: Vec<String>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    company_id: Option<i64>,
}

impl From<QuestionRequest> for QuestionFields {
    fn from(request: QuestionRequest) -> Self {
        Self {
            genre: request.genre,
            title: request.title,
            choices: request.choices,
            answer: request.answer,
            explanation: request.explanation,
            company_id: request.company_id,
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct StartQuizRequest {
    #[validate(custom(function = not_blank))]
    genre: String,
    #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
    count: u32,
}

#[derive(Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    question_id: i64,
    user_answer: Vec<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 1, max = 64, message = "must be between 1 and 64 characters"),
        regex(path = *USERNAME_PATTERN, message = "may only contain letters, digits and _.@-")
    )]
    username: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    password: String,
    #[validate(custom(function = not_blank))]
    role: String,
    #[serde(default)]
    company_id: Option<i64>,
}

#[derive(Deserialize, Validate)]
pub struct CompanyAssignmentRequest {
    /// Blank unassigns the user.
    #[serde(default)]
    company_name: String,
}

#[derive(Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    new_password: String,
}

#[derive(Deserialize, Validate)]
pub struct CompanyRequest {
    #[validate(custom(function = not_blank))]
    name: String,
}

#[derive(Deserialize, Validate)]
pub struct RegisterCompanyRequest {
    #[validate(custom(function = not_blank))]
    name: String,
    #[validate(
        length(min = 1, max = 64, message = "must be between 1 and 64 characters"),
        regex(path = *USERNAME_PATTERN, message = "may only contain letters, digits and _.@-")
    )]
    admin_username: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    admin_password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[post("/auth/signup", data = "<signup>")]
pub async fn api_signup(
    signup: Json<SignupRequest>,
    db: &State<SqlitePool>,
) -> Result<Custom<Json<User>>, AppError> {
    let signup = signup.validated()?;
    let user = users::signup(db, &signup.username, &signup.password).await?;
    Ok(Custom(Status::Created, Json(user)))
}

#[post("/auth/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    db: &State<SqlitePool>,
    signer: &State<TokenSigner>,
) -> Result<Json<LoginOutcome>, AppError> {
    let login = login.validated()?;
    let outcome = users::login(db, signer, login.username.trim(), &login.password).await?;
    Ok(Json(outcome))
}

#[get("/auth/me")]
pub async fn api_me(ctx: AccessContext, db: &State<SqlitePool>) -> Result<Json<User>, AppError> {
    Ok(Json(users::get_user(db, ctx.user_id).await?))
}

#[get("/questions?<genre>")]
pub async fn api_list_questions(
    genre: Option<&str>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Vec<Question>>, AppError> {
    Ok(Json(questions::list_questions(db, &ctx, genre).await?))
}

#[get("/questions/<id>")]
pub async fn api_get_question(
    id: i64,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Question>, AppError> {
    Ok(Json(questions::get_question(db, &ctx, id).await?))
}

#[get("/questions/common")]
pub async fn api_common_questions(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Vec<Question>>, AppError> {
    Ok(Json(questions::common_questions(db, &ctx).await?))
}

#[post("/questions/<id>/copy")]
pub async fn api_copy_question(
    id: i64,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Custom<Json<Question>>, AppError> {
    let copied = questions::copy_question(db, &ctx, id).await?;
    Ok(Custom(Status::Created, Json(copied)))
}

#[post("/questions", data = "<question>")]
pub async fn api_create_question(
    question: Json<QuestionRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Custom<Json<Question>>, AppError> {
    let question = question.validated()?;
    let created = questions::create_question(db, &ctx, question.into()).await?;
    Ok(Custom(Status::Created, Json(created)))
}

#[put("/questions/<id>", data = "<question>")]
pub async fn api_update_question(
    id: i64,
    question: Json<QuestionRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Question>, AppError> {
    let question = question.validated()?;
    Ok(Json(
        questions::update_question(db, &ctx, id, question.into()).await?,
    ))
}

#[delete("/questions/<id>")]
pub async fn api_delete_question(
    id: i64,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<MessageResponse>, AppError> {
    questions::delete_question(db, &ctx, id).await?;
    Ok(MessageResponse::new("Question deleted"))
}

#[get("/quiz/genres")]
pub async fn api_genres(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<BTreeMap<String, Vec<i64>>>, AppError> {
    Ok(Json(questions::genres(db, &ctx).await?))
}

#[post("/quiz/start", data = "<request>")]
pub async fn api_start_quiz(
    request: Json<StartQuizRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<QuizSession>, AppError> {
    let request = request.validated()?;
    Ok(Json(
        questions::start_quiz(db, &ctx, &request.genre, request.count as usize).await?,
    ))
}

#[get("/quiz/retry/<id>")]
pub async fn api_retry_question(
    id: i64,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<QuizSession>, AppError> {
    Ok(Json(questions::retry_question(db, &ctx, id).await?))
}

#[post("/quiz/submit_answer", data = "<request>")]
pub async fn api_submit_answer(
    request: Json<SubmitAnswerRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
    log: &State<ActivityLog>,
) -> Result<Json<SubmitOutcome>, AppError> {
    let request = request.validated()?;
    let submission = Submission {
        question_id: request.question_id,
        user_answer: request.user_answer,
        session_id: request.session_id,
        started_at: request.started_at,
    };
    Ok(Json(
        questions::submit_answer(db, log, &ctx, submission).await?,
    ))
}

#[get("/user/dashboard")]
pub async fn api_dashboard(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(analytics::dashboard(db, &ctx).await?))
}

#[get("/user/review")]
pub async fn api_review(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<QuizSession>, AppError> {
    Ok(Json(analytics::review_set(db, &ctx).await?))
}

#[get("/user/weak")]
pub async fn api_weak(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<QuizSession>, AppError> {
    Ok(Json(analytics::weak_set(db, &ctx).await?))
}

#[get("/user/warmup?<genre>&<count>")]
pub async fn api_warmup(
    genre: Option<&str>,
    count: Option<u32>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<QuizSession>, AppError> {
    let count = count.unwrap_or(DEFAULT_WARMUP_COUNT) as usize;
    Ok(Json(analytics::warmup_set(db, &ctx, genre, count).await?))
}

#[get("/user/my_results")]
pub async fn api_my_results(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Vec<MyResult>>, AppError> {
    Ok(Json(results::my_results(db, &ctx).await?))
}

#[get("/user/analysis")]
pub async fn api_analysis(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Diagnosis>, AppError> {
    Ok(Json(analytics::analysis(db, &ctx).await?))
}

#[get("/admin/users")]
pub async fn api_list_users(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(users::list_users(db, &ctx).await?))
}

#[post("/admin/users", data = "<request>")]
pub async fn api_create_user(
    request: Json<CreateUserRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Custom<Json<User>>, AppError> {
    let request = request.validated()?;
    let role = Role::from_str(&request.role)
        .map_err(|err| AppError::Validation(err.to_string()))?;

    let user = users::create_user(
        db,
        &ctx,
        NewUser {
            username: request.username,
            password: request.password,
            role,
            company_id: request.company_id,
        },
    )
    .await?;
    Ok(Custom(Status::Created, Json(user)))
}

#[put("/admin/users/<id>/company", data = "<request>")]
pub async fn api_update_user_company(
    id: i64,
    request: Json<CompanyAssignmentRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<User>, AppError> {
    let request = request.validated()?;
    Ok(Json(
        users::update_user_company(db, &ctx, id, &request.company_name).await?,
    ))
}

#[put("/admin/users/<id>/password", data = "<request>")]
pub async fn api_reset_password(
    id: i64,
    request: Json<PasswordResetRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<MessageResponse>, AppError> {
    let request = request.validated()?;
    users::reset_password(db, &ctx, id, &request.new_password).await?;
    Ok(MessageResponse::new("Password updated"))
}

#[get("/admin/results")]
pub async fn api_admin_results(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Vec<AdminResult>>, AppError> {
    Ok(Json(results::admin_results(db, &ctx).await?))
}

#[get("/admin/logs")]
pub async fn api_activity_logs(
    ctx: AccessContext,
    db: &State<SqlitePool>,
    log: &State<ActivityLog>,
) -> Result<Json<Vec<ActivityLogEntry>>, AppError> {
    Ok(Json(activity_log::activity_logs(db, log, &ctx).await?))
}

#[get("/admin/log_summary")]
pub async fn api_activity_summary(
    ctx: AccessContext,
    db: &State<SqlitePool>,
    log: &State<ActivityLog>,
) -> Result<Json<ActivitySummary>, AppError> {
    Ok(Json(activity_log::activity_summary(db, log, &ctx).await?))
}

#[get("/master/companies")]
pub async fn api_list_companies(
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<Vec<Company>>, AppError> {
    Ok(Json(companies::list_companies(db, &ctx).await?))
}

#[post("/master/companies", data = "<request>")]
pub async fn api_create_company(
    request: Json<CompanyRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Custom<Json<Company>>, AppError> {
    let request = request.validated()?;
    let company = companies::create_company(db, &ctx, &request.name).await?;
    Ok(Custom(Status::Created, Json(company)))
}

#[delete("/master/companies/<id>")]
pub async fn api_delete_company(
    id: i64,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Json<MessageResponse>, AppError> {
    companies::delete_company(db, &ctx, id).await?;
    Ok(MessageResponse::new("Company deleted"))
}

#[post("/master/register_company", data = "<request>")]
pub async fn api_register_company(
    request: Json<RegisterCompanyRequest>,
    ctx: AccessContext,
    db: &State<SqlitePool>,
) -> Result<Custom<Json<RegisteredCompany>>, AppError> {
    let request = request.validated()?;
    let registered = companies::register_company(
        db,
        &ctx,
        &request.name,
        request.admin_username.trim(),
        &request.admin_password,
    )
    .await?;
    Ok(Custom(Status::Created, Json(registered)))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
