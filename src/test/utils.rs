#[cfg(test)]
pub mod test_utils {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::str::FromStr;

    use chrono::{Duration, Utc};
    use jsonwebtoken::Algorithm;
    use rocket::http::{ContentType, Header};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::SqlitePool;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use uuid::Uuid;

    use crate::activity_log::ActivityLog;
    use crate::auth::{AccessContext, Role, TokenSigner};
    use crate::db::results::{NewResult, insert_result};
    use crate::db::users::{NewUser, find_user, insert_user};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::auth::User;

    pub async fn find_user_by_username(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

        match row {
            Some((id,)) => find_user(pool, id).await,
            None => Ok(None),
        }
    }

    pub static STANDARD_PASSWORD: &str = "password123";
    pub static TEST_SECRET: &[u8] = b"quiz-platform-test-secret";

    pub struct TestUser {
        pub username: String,
        pub role: Role,
        pub company: Option<String>,
        pub password: String,
    }

    pub struct TestQuestion {
        pub title: String,
        pub genre: String,
        pub choices: String,
        pub answer: String,
        pub company: Option<String>,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        companies: Vec<String>,
        users: Vec<TestUser>,
        questions: Vec<TestQuestion>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn company(mut self, name: &str) -> Self {
            self.companies.push(name.to_string());
            self
        }

        fn user(mut self, username: &str, role: Role, company: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role,
                company: company.map(String::from),
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn master(self, username: &str) -> Self {
            self.user(username, Role::Master, None)
        }

        pub fn admin(self, username: &str, company: Option<&str>) -> Self {
            self.user(username, Role::Admin, company)
        }

        pub fn staff(self, username: &str, company: Option<&str>) -> Self {
            self.user(username, Role::Staff, company)
        }

        /// `choices` and `answer` are colon-delimited, as stored.
        pub fn question(
            mut self,
            title: &str,
            genre: &str,
            choices: &str,
            answer: &str,
            company: Option<&str>,
        ) -> Self {
            self.questions.push(TestQuestion {
                title: title.to_string(),
                genre: genre.to_string(),
                choices: choices.to_string(),
                answer: answer.to_string(),
                company: company.map(String::from),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            // A single connection that never idles out keeps the in-memory
            // database alive for the whole test.
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?;

            crate::db::run_migrations(&pool).await?;

            let mut company_ids: HashMap<String, i64> = HashMap::new();
            let mut user_ids: HashMap<String, i64> = HashMap::new();
            let mut question_ids: HashMap<String, i64> = HashMap::new();

            for name in &self.companies {
                let res = sqlx::query("INSERT INTO companies (name) VALUES (?)")
                    .bind(name)
                    .execute(&pool)
                    .await?;
                company_ids.insert(name.clone(), res.last_insert_rowid());
            }

            for user in &self.users {
                let company_id = user
                    .company
                    .as_ref()
                    .and_then(|name| company_ids.get(name).copied());

                let mut conn = pool.acquire().await?;
                let user_id = insert_user(
                    &mut conn,
                    &NewUser {
                        username: user.username.clone(),
                        password: user.password.clone(),
                        role: user.role,
                        company_id,
                    },
                )
                .await?;
                user_ids.insert(user.username.clone(), user_id);
            }

            let creator_id = self
                .users
                .iter()
                .find(|u| matches!(u.role, Role::Master | Role::Admin))
                .and_then(|u| user_ids.get(&u.username).copied());

            for question in &self.questions {
                let company_id = question
                    .company
                    .as_ref()
                    .and_then(|name| company_ids.get(name).copied());

                let res = sqlx::query(
                    "INSERT INTO questions (creator_id, company_id, genre, title, choices, answer, explanation)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(creator_id)
                .bind(company_id)
                .bind(&question.genre)
                .bind(&question.title)
                .bind(&question.choices)
                .bind(&question.answer)
                .bind(format!("Explanation for {}", question.title))
                .execute(&pool)
                .await?;
                question_ids.insert(question.title.clone(), res.last_insert_rowid());
            }

            Ok(TestDb {
                pool,
                company_ids,
                user_ids,
                question_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: SqlitePool,
        pub company_ids: HashMap<String, i64>,
        pub user_ids: HashMap<String, i64>,
        pub question_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn company_id(&self, name: &str) -> i64 {
            self.company_ids[name]
        }

        pub fn user_id(&self, username: &str) -> i64 {
            self.user_ids[username]
        }

        pub fn question_id(&self, title: &str) -> i64 {
            self.question_ids[title]
        }

        /// The access context a verified token for `username` would resolve to.
        pub async fn context(&self, username: &str) -> AccessContext {
            find_user_by_username(&self.pool, username)
                .await
                .expect("Failed to look up user")
                .expect("User not found")
                .access_context()
        }

        /// Inserts a result row directly, `days_ago` days in the past.
        pub async fn record_answer(
            &self,
            username: &str,
            question_title: &str,
            is_correct: bool,
            days_ago: i64,
        ) {
            let answered_at = (Utc::now() - Duration::days(days_ago)).naive_utc();
            let mut conn = self.pool.acquire().await.expect("Failed to acquire connection");
            insert_result(
                &mut conn,
                &NewResult {
                    user_id: self.user_id(username),
                    question_id: self.question_id(question_title),
                    session_id: "test-session",
                    user_answer: &[],
                    is_correct,
                    answered_at,
                },
            )
            .await
            .expect("Failed to record answer");
        }
    }

    pub fn test_signer() -> TokenSigner {
        TokenSigner::new(TEST_SECRET, Algorithm::HS256, Duration::hours(8))
    }

    /// A fresh log file under the system temp dir; it does not exist yet.
    pub fn temp_log_path() -> PathBuf {
        std::env::temp_dir().join(format!("quiz-platform-{}.ndjson", Uuid::new_v4()))
    }

    /// Companies Acme and Globex, one admin each, staff in both, a master,
    /// and a mix of global and tenant questions.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .company("Acme")
            .company("Globex")
            .master("root")
            .admin("acme_admin", Some("Acme"))
            .admin("globex_admin", Some("Globex"))
            .staff("acme_staff", Some("Acme"))
            .staff("globex_staff", Some("Globex"))
            .question("Global SQL", "SQL", "A:B:C", "A", None)
            .question("Acme SQL", "SQL:DB", "A:B:C", "A:B", Some("Acme"))
            .question("Acme math", "math", "1:2:3", "2", Some("Acme"))
            .question("Globex SQL", "SQL", "A:B", "B", Some("Globex"))
            .question("Global math", "math:basics", "x:y", "x", None)
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(
            test_db.pool.clone(),
            test_signer(),
            ActivityLog::new(temp_log_path()),
        );
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build Rocket client");
        (client, test_db)
    }

    /// Logs in through the API and returns the bearer header for later requests.
    pub async fn login_test_user(client: &Client, username: &str) -> Header<'static> {
        let response = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": username,
                    "password": STANDARD_PASSWORD
                })
                .to_string(),
            )
            .dispatch()
            .await;

        let body: serde_json::Value = response
            .into_json()
            .await
            .expect("Login response was not JSON");
        let token = body["token"].as_str().expect("Login returned no token");

        Header::new("Authorization", format!("Bearer {}", token))
    }
}
