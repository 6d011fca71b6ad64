use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quiz::split_list;

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCompany {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl From<DbCompany> for Company {
    fn from(company: DbCompany) -> Self {
        Self {
            id: company.id.unwrap_or_default(),
            name: company.name.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub creator_id: Option<i64>,
    pub company_id: Option<i64>,
    pub genre: String,
    pub title: String,
    pub choices: String,
    pub answer: String,
    pub explanation: String,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbQuestion {
    pub id: Option<i64>,
    pub creator_id: Option<i64>,
    pub company_id: Option<i64>,
    pub genre: Option<String>,
    pub title: Option<String>,
    pub choices: Option<String>,
    pub answer: Option<String>,
    pub explanation: Option<String>,
}

impl From<DbQuestion> for Question {
    fn from(question: DbQuestion) -> Self {
        Self {
            id: question.id.unwrap_or_default(),
            creator_id: question.creator_id,
            company_id: question.company_id,
            genre: question.genre.unwrap_or_default(),
            title: question.title.unwrap_or_default(),
            choices: question.choices.unwrap_or_default(),
            answer: question.answer.unwrap_or_default(),
            explanation: question.explanation.unwrap_or_default(),
        }
    }
}

impl Question {
    pub fn choice_list(&self) -> Vec<String> {
        split_list(&self.choices)
    }

    pub fn answer_list(&self) -> Vec<String> {
        split_list(&self.answer)
    }
}

/// A question as handed to a quiz taker: the answer is withheld.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuizQuestion {
    pub id: i64,
    pub genre: String,
    pub title: String,
    pub choices: Vec<String>,
}

impl From<&Question> for QuizQuestion {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            genre: question.genre.clone(),
            title: question.title.clone(),
            choices: question.choice_list(),
        }
    }
}

/// A result joined to its question, as listed to the user who answered it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MyResult {
    pub id: i64,
    pub question_id: i64,
    pub question_title: String,
    pub genre: String,
    pub session_id: String,
    pub user_answer: Vec<String>,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbMyResult {
    pub id: Option<i64>,
    pub question_id: Option<i64>,
    pub question_title: Option<String>,
    pub genre: Option<String>,
    pub session_id: Option<String>,
    pub user_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub answered_at: Option<NaiveDateTime>,
}

impl From<DbMyResult> for MyResult {
    fn from(db: DbMyResult) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            question_id: db.question_id.unwrap_or_default(),
            question_title: db.question_title.unwrap_or_default(),
            genre: db.genre.unwrap_or_default(),
            session_id: db.session_id.unwrap_or_default(),
            user_answer: db
                .user_answer
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_default(),
            is_correct: db.is_correct.unwrap_or_default(),
            answered_at: to_utc(db.answered_at),
        }
    }
}

/// A result joined to the answering user and their company, for administrators.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdminResult {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub question_id: i64,
    pub question_title: Option<String>,
    pub genre: Option<String>,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbAdminResult {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub question_id: Option<i64>,
    pub question_title: Option<String>,
    pub genre: Option<String>,
    pub is_correct: Option<bool>,
    pub answered_at: Option<NaiveDateTime>,
}

impl From<DbAdminResult> for AdminResult {
    fn from(db: DbAdminResult) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            username: db.username.unwrap_or_default(),
            company_id: db.company_id,
            company_name: db.company_name,
            question_id: db.question_id.unwrap_or_default(),
            question_title: db.question_title,
            genre: db.genre,
            is_correct: db.is_correct.unwrap_or_default(),
            answered_at: to_utc(db.answered_at),
        }
    }
}
