use serde::Serialize;

use crate::error::AppError;

use super::{AccessContext, Role};

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub role: Option<String>,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let raw_role = user.role.unwrap_or_default();
        let role = raw_role
            .parse()
            .map_err(|_| AppError::Internal(format!("Stored role is not valid: {}", raw_role)))?;

        Ok(Self {
            id: user.id.unwrap_or_default(),
            username: user.username.unwrap_or_default(),
            role,
            company_id: user.company_id,
            company_name: user.company_name,
        })
    }
}

/// Row used only when checking a password.
#[derive(sqlx::FromRow, Clone)]
pub struct DbCredential {
    pub id: Option<i64>,
    pub password_hash: Option<String>,
}

impl User {
    pub fn access_context(&self) -> AccessContext {
        AccessContext {
            user_id: self.id,
            username: self.username.clone(),
            role: self.role,
            company_id: self.company_id,
        }
    }
}
