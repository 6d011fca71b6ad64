use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use crate::auth::{AccessContext, Permission, Role, User};
use crate::db::users::{NewUser, get_user, insert_user};
use crate::error::AppError;
use crate::models::{Company, DbCompany};

#[derive(Debug, Serialize)]
pub struct RegisteredCompany {
    pub company: Company,
    pub admin: User,
}

#[instrument(skip(pool))]
pub async fn find_company(pool: &SqlitePool, id: i64) -> Result<Option<Company>, AppError> {
    let row = sqlx::query_as::<_, DbCompany>("SELECT id, name FROM companies WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Company::from))
}

pub(crate) async fn find_company_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Company>, AppError> {
    let row = sqlx::query_as::<_, DbCompany>("SELECT id, name FROM companies WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(Company::from))
}

async fn insert_company(conn: &mut SqliteConnection, name: &str) -> Result<i64, AppError> {
    if find_company_by_name(&mut *conn, name).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Company '{}' already exists",
            name
        )));
    }

    let res = sqlx::query("INSERT INTO companies (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(|err| AppError::from_write(err, &format!("Company '{}' already exists", name)))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_companies(
    pool: &SqlitePool,
    ctx: &AccessContext,
) -> Result<Vec<Company>, AppError> {
    ctx.require_permission(Permission::ViewOwnCompany)?;
    info!("Listing companies");

    let rows = match ctx.role {
        Role::Master => {
            sqlx::query_as::<_, DbCompany>("SELECT id, name FROM companies ORDER BY id")
                .fetch_all(pool)
                .await?
        }
        _ => {
            sqlx::query_as::<_, DbCompany>("SELECT id, name FROM companies WHERE id = ?")
                .bind(ctx.company_id)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows.into_iter().map(Company::from).collect())
}

#[instrument(skip(pool))]
pub async fn create_company(
    pool: &SqlitePool,
    ctx: &AccessContext,
    name: &str,
) -> Result<Company, AppError> {
    ctx.authorize(&[Role::Master])?;
    info!("Creating company");

    let name = name.trim();
    let mut conn = pool.acquire().await?;
    let id = insert_company(&mut conn, name).await?;

    Ok(Company {
        id,
        name: name.to_string(),
    })
}

/// Creates a company together with its first admin. Either both rows are
/// committed or neither is.
#[instrument(skip(pool, admin_password))]
pub async fn register_company(
    pool: &SqlitePool,
    ctx: &AccessContext,
    name: &str,
    admin_username: &str,
    admin_password: &str,
) -> Result<RegisteredCompany, AppError> {
    ctx.authorize(&[Role::Master])?;
    info!("Registering company with admin");

    let name = name.trim();
    let mut tx = pool.begin().await?;

    let outcome: Result<(i64, i64), AppError> = async {
        let company_id = insert_company(&mut tx, name).await?;
        let admin_id = insert_user(
            &mut tx,
            &NewUser {
                username: admin_username.to_string(),
                password: admin_password.to_string(),
                role: Role::Admin,
                company_id: Some(company_id),
            },
        )
        .await?;
        Ok((company_id, admin_id))
    }
    .await;

    let (company_id, admin_id) = match outcome {
        Ok(ids) => {
            tx.commit().await?;
            ids
        }
        Err(err) => {
            tracing::warn!(error = %err, "Rolling back company registration");
            tx.rollback().await?;
            return Err(err);
        }
    };

    Ok(RegisteredCompany {
        company: Company {
            id: company_id,
            name: name.to_string(),
        },
        admin: get_user(pool, admin_id).await?,
    })
}

/// Companies are only removed once nothing refers to them.
#[instrument(skip(pool))]
pub async fn delete_company(
    pool: &SqlitePool,
    ctx: &AccessContext,
    company_id: i64,
) -> Result<(), AppError> {
    ctx.authorize(&[Role::Master])?;
    info!("Deleting company");

    let mut tx = pool.begin().await?;

    let outcome: Result<(), AppError> = async {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM companies WHERE id = ?")
            .bind(company_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!(
                "Company with id {} not found",
                company_id
            )));
        }

        let (members,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE company_id = ?")
            .bind(company_id)
            .fetch_one(&mut *tx)
            .await?;
        let (questions,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM questions WHERE company_id = ?")
                .bind(company_id)
                .fetch_one(&mut *tx)
                .await?;

        if members > 0 || questions > 0 {
            return Err(AppError::Conflict(format!(
                "Company still has {} users and {} questions",
                members, questions
            )));
        }

        sqlx::query("DELETE FROM companies WHERE id = ?")
            .bind(company_id)
            .execute(&mut *tx)
            .await?;
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            tx.commit().await?;
            Ok(())
        }
        Err(err) => {
            tx.rollback().await?;
            Err(err)
        }
    }
}
