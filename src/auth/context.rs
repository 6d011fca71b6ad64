use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::AppError;

use super::{Permission, Role};

/// Identity of the caller for one request, resolved from a verified bearer
/// token and a fresh read of the credential store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccessContext {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub company_id: Option<i64>,
}

/// Which users/results rows a caller may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    All,
    /// `None` is an admin that has not been assigned to a company and so sees nothing.
    Company(Option<i64>),
    OwnRows(i64),
}

/// Which questions a caller may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionScope {
    All,
    GlobalOr(Option<i64>),
}

impl AccessContext {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "role {} may not perform this action",
                self.role
            )))
        }
    }

    pub fn authorize(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role.as_str(),
                required = ?roles,
                "Role check failed"
            );
            Err(AppError::Authorization(format!(
                "role {} may not perform this action",
                self.role
            )))
        }
    }

    pub fn tenant_scope(&self) -> TenantScope {
        match self.role {
            Role::Master => TenantScope::All,
            Role::Admin => TenantScope::Company(self.company_id),
            Role::Staff => TenantScope::OwnRows(self.user_id),
        }
    }

    pub fn question_scope(&self) -> QuestionScope {
        match self.role {
            Role::Master => QuestionScope::All,
            _ => QuestionScope::GlobalOr(self.company_id),
        }
    }

    /// Whether the caller may update or delete a question owned by `company_id`.
    pub fn can_mutate_question(&self, company_id: Option<i64>) -> bool {
        match self.role {
            Role::Master => true,
            Role::Admin => self.company_id.is_some() && company_id == self.company_id,
            Role::Staff => false,
        }
    }

    /// Whether `company_id` (of some target user) falls inside the caller's tenant.
    pub fn owns_tenant_of(&self, company_id: Option<i64>) -> bool {
        match self.tenant_scope() {
            TenantScope::All => true,
            TenantScope::Company(Some(own)) => company_id == Some(own),
            TenantScope::Company(None) | TenantScope::OwnRows(_) => false,
        }
    }
}

impl TenantScope {
    /// Appends ` AND (...)` restricting `company_column`/`user_column` to this scope.
    pub fn push_predicate(
        &self,
        builder: &mut QueryBuilder<'_, Sqlite>,
        company_column: &str,
        user_column: &str,
    ) {
        match *self {
            TenantScope::All => {}
            TenantScope::Company(Some(company_id)) => {
                builder
                    .push(format!(" AND {} = ", company_column))
                    .push_bind(company_id);
            }
            TenantScope::Company(None) => {
                builder.push(" AND 0 = 1");
            }
            TenantScope::OwnRows(user_id) => {
                builder
                    .push(format!(" AND {} = ", user_column))
                    .push_bind(user_id);
            }
        }
    }
}

impl QuestionScope {
    pub fn push_predicate(&self, builder: &mut QueryBuilder<'_, Sqlite>, company_column: &str) {
        match *self {
            QuestionScope::All => {}
            QuestionScope::GlobalOr(Some(company_id)) => {
                builder
                    .push(format!(
                        " AND ({0} IS NULL OR {0} = ",
                        company_column
                    ))
                    .push_bind(company_id)
                    .push(")");
            }
            QuestionScope::GlobalOr(None) => {
                builder.push(format!(" AND {} IS NULL", company_column));
            }
        }
    }
}
