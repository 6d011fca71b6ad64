#[macro_use]
extern crate rocket;

mod activity_log;
mod api;
mod auth;
mod db;
mod diagnosis;
mod env;
mod error;
mod models;
mod quiz;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use activity_log::ActivityLog;
use api::{
    api_activity_logs, api_activity_summary, api_admin_results, api_analysis, api_common_questions,
    api_copy_question, api_create_company, api_create_question, api_create_user, api_dashboard,
    api_delete_company, api_delete_question, api_genres, api_get_question, api_list_companies,
    api_list_questions, api_list_users, api_login, api_me, api_my_results, api_register_company,
    api_reset_password, api_retry_question, api_review, api_signup, api_start_quiz,
    api_submit_answer, api_update_question, api_update_user_company, api_warmup, api_weak, health,
};
use auth::{
    TokenSigner, bad_request_api, forbidden_api, internal_error_api, not_found_api,
    unauthorized_api, unprocessable_api,
};
use env::{AppConfig, load_environment};
use error::AppError;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    load_environment()?;
    let _telemetry = init_tracing()?;

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let signer = TokenSigner::from_config(&config);
    let log = ActivityLog::new(config.activity_log_path.clone());

    let _rocket = init_rocket(pool, signer, log).launch().await?;

    Ok(())
}

pub fn init_rocket(pool: SqlitePool, signer: TokenSigner, log: ActivityLog) -> Rocket<Build> {
    info!(activity_log = %log.path().display(), "Starting quiz platform");

    rocket::build()
        .manage(pool)
        .manage(signer)
        .manage(log)
        .mount(
            "/api",
            routes![
                api_signup,
                api_login,
                api_me,
                api_list_questions,
                api_get_question,
                api_common_questions,
                api_copy_question,
                api_create_question,
                api_update_question,
                api_delete_question,
                api_genres,
                api_start_quiz,
                api_retry_question,
                api_submit_answer,
                api_dashboard,
                api_review,
                api_weak,
                api_warmup,
                api_my_results,
                api_analysis,
                api_list_users,
                api_create_user,
                api_update_user_company,
                api_reset_password,
                api_admin_results,
                api_activity_logs,
                api_activity_summary,
                api_list_companies,
                api_create_company,
                api_delete_company,
                api_register_company,
            ],
        )
        .register(
            "/api",
            catchers![
                unauthorized_api,
                forbidden_api,
                not_found_api,
                bad_request_api,
                unprocessable_api,
                internal_error_api,
            ],
        )
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
