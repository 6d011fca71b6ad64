use std::collections::HashSet;

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{info, instrument, warn};

use crate::auth::{
    AccessContext, AuthError, DbCredential, DbUser, Permission, Role, TenantScope, TokenSigner,
    User, hash_password, verify_password,
};
use crate::db::companies::{find_company, find_company_by_name};
use crate::error::AppError;

const USER_COLUMNS: &str = "SELECT u.id, u.username, u.role, u.company_id, c.name AS company_name
     FROM users u
     LEFT JOIN companies c ON c.id = u.company_id";

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub company_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

#[instrument(skip(pool))]
pub async fn find_user(pool: &SqlitePool, id: i64) -> Result<Option<User>, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("{} WHERE u.id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(User::try_from).transpose()
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<User, AppError> {
    find_user(pool, id).await?.ok_or_else(|| {
        AppError::NotFound(format!("User with id {} not found in database", id))
    })
}

pub(crate) async fn username_taken(
    conn: &mut SqliteConnection,
    username: &str,
) -> Result<bool, AppError> {
    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(existing.is_some())
}

/// Inserts a user row. The caller has already checked authorization.
pub(crate) async fn insert_user(
    conn: &mut SqliteConnection,
    user: &NewUser,
) -> Result<i64, AppError> {
    if username_taken(&mut *conn, &user.username).await? {
        return Err(AppError::Conflict(format!(
            "Username '{}' already exists",
            user.username
        )));
    }

    let hashed_password = hash_password(&user.password)?;

    let res = sqlx::query(
        "INSERT INTO users (username, password_hash, role, company_id) VALUES (?, ?, ?, ?)",
    )
    .bind(&user.username)
    .bind(hashed_password)
    .bind(user.role.as_str())
    .bind(user.company_id)
    .execute(&mut *conn)
    .await
    .map_err(|err| {
        AppError::from_write(err, &format!("Username '{}' already exists", user.username))
    })?;

    Ok(res.last_insert_rowid())
}

/// Public registration. The very first account becomes the master; every later
/// one is an unassigned staff member.
#[instrument(skip(pool, password))]
pub async fn signup(pool: &SqlitePool, username: &str, password: &str) -> Result<User, AppError> {
    info!("Signing up new user");
    let mut tx = pool.begin().await?;

    let outcome: Result<i64, AppError> = async {
        let (existing_users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;

        let role = if existing_users == 0 {
            info!("No users exist yet, bootstrapping master account");
            Role::Master
        } else {
            Role::Staff
        };

        insert_user(
            &mut tx,
            &NewUser {
                username: username.to_string(),
                password: password.to_string(),
                role,
                company_id: None,
            },
        )
        .await
    }
    .await;

    let user_id = match outcome {
        Ok(user_id) => {
            tx.commit().await?;
            user_id
        }
        Err(err) => {
            tx.rollback().await?;
            return Err(err);
        }
    };

    get_user(pool, user_id).await
}

#[instrument(skip(pool, signer, password))]
pub async fn login(
    pool: &SqlitePool,
    signer: &TokenSigner,
    username: &str,
    password: &str,
) -> Result<LoginOutcome, AppError> {
    info!("Authenticating user");
    let credential = sqlx::query_as::<_, DbCredential>(
        "SELECT id, password_hash FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    let user_id = match credential {
        Some(DbCredential {
            id: Some(id),
            password_hash: Some(hash),
        }) if verify_password(password, &hash) => id,
        _ => {
            warn!("Login rejected");
            return Err(AuthError::Credentials.into());
        }
    };

    let user = get_user(pool, user_id).await?;
    let token = signer.sign(user.id, &user.username, user.role.as_str(), user.company_id)?;

    Ok(LoginOutcome { token, user })
}

#[instrument(skip(pool))]
pub async fn list_users(pool: &SqlitePool, ctx: &AccessContext) -> Result<Vec<User>, AppError> {
    ctx.require_permission(Permission::ViewTenantUsers)?;
    info!("Listing users");

    let mut builder = QueryBuilder::<Sqlite>::new(USER_COLUMNS);
    builder.push(" WHERE 1 = 1");
    ctx.tenant_scope()
        .push_predicate(&mut builder, "u.company_id", "u.id");
    builder.push(" ORDER BY u.id");

    let rows = builder.build_query_as::<DbUser>().fetch_all(pool).await?;

    rows.into_iter().map(User::try_from).collect()
}

#[instrument(skip(pool, new_user), fields(username = %new_user.username, role = %new_user.role))]
pub async fn create_user(
    pool: &SqlitePool,
    ctx: &AccessContext,
    new_user: NewUser,
) -> Result<User, AppError> {
    ctx.require_permission(Permission::CreateUsers)?;
    info!("Creating new user");

    let company_id = match ctx.role {
        Role::Master => {
            if let Some(company_id) = new_user.company_id {
                find_company(pool, company_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Company with id {} not found", company_id))
                })?;
            }
            new_user.company_id
        }
        Role::Admin => {
            if new_user.role == Role::Master {
                return Err(AppError::Authorization(
                    "admins may only create staff or admin accounts".to_string(),
                ));
            }
            let own = ctx.company_id.ok_or_else(|| {
                AppError::Authorization("admin is not assigned to a company".to_string())
            })?;
            if new_user.company_id.is_some_and(|requested| requested != own) {
                return Err(AppError::Authorization(
                    "admins may only create users in their own company".to_string(),
                ));
            }
            Some(own)
        }
        Role::Staff => {
            return Err(AppError::Authorization(
                "staff may not create users".to_string(),
            ));
        }
    };

    let mut conn = pool.acquire().await?;
    let user_id = insert_user(
        &mut conn,
        &NewUser {
            company_id,
            ..new_user
        },
    )
    .await?;
    drop(conn);

    get_user(pool, user_id).await
}

/// Moves a user to the company called `company_name`, or unassigns them when
/// the name is blank.
#[instrument(skip(pool))]
pub async fn update_user_company(
    pool: &SqlitePool,
    ctx: &AccessContext,
    user_id: i64,
    company_name: &str,
) -> Result<User, AppError> {
    ctx.authorize(&[Role::Master])?;
    info!("Reassigning user company");

    let company_id = match company_name.trim() {
        "" => None,
        name => {
            let mut conn = pool.acquire().await?;
            let company = find_company_by_name(&mut conn, name)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Company '{}' not found", name)))?;
            Some(company.id)
        }
    };

    get_user(pool, user_id).await?;

    sqlx::query("UPDATE users SET company_id = ? WHERE id = ?")
        .bind(company_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    get_user(pool, user_id).await
}

#[instrument(skip(pool, new_password))]
pub async fn reset_password(
    pool: &SqlitePool,
    ctx: &AccessContext,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    ctx.require_permission(Permission::ResetPasswords)?;
    info!("Resetting user password");

    let target = get_user(pool, user_id).await?;
    if !ctx.owns_tenant_of(target.company_id) {
        return Err(AppError::Authorization(
            "target user belongs to another company".to_string(),
        ));
    }

    let hashed_password = hash_password(new_password)?;

    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Usernames whose activity the caller may read; `None` means every user.
#[instrument(skip(pool))]
pub async fn visible_usernames(
    pool: &SqlitePool,
    ctx: &AccessContext,
) -> Result<Option<HashSet<String>>, AppError> {
    let scope = ctx.tenant_scope();
    if scope == TenantScope::All {
        return Ok(None);
    }

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT u.username FROM users u WHERE 1 = 1");
    scope.push_predicate(&mut builder, "u.company_id", "u.id");

    let rows: Vec<(String,)> = builder.build_query_as().fetch_all(pool).await?;

    Ok(Some(rows.into_iter().map(|(username,)| username).collect()))
}
