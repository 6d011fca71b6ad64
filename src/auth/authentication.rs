use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;
use tracing::instrument;

use crate::db::users::find_user;
use crate::validation::ErrorResponse;

use super::{AccessContext, AuthError, TokenSigner};

/// The reason the credential guard rejected a request, kept for the 401 catcher.
struct RejectedCredential(Option<AuthError>);

/// Resolves an `Authorization` header value into the caller's `AccessContext`.
///
/// The user row is always re-read so that role and company changes apply to
/// tokens issued before them.
#[instrument(skip_all)]
pub async fn resolve(
    pool: &SqlitePool,
    signer: &TokenSigner,
    authorization: Option<&str>,
) -> Result<AccessContext, AuthError> {
    let header = authorization.ok_or(AuthError::Missing)?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Invalid)?;

    let claims = signer.verify(token)?;
    let user_id = claims.user_id()?;

    match find_user(pool, user_id).await {
        Ok(Some(user)) => {
            tracing::info!(username = %user.username, role = %user.role, "Caller authenticated");
            Ok(user.access_context())
        }
        Ok(None) => {
            tracing::warn!(user_id, "Token refers to a user that no longer exists");
            Err(AuthError::Invalid)
        }
        Err(err) => {
            tracing::error!(user_id, error = ?err, "Failed to load user for token");
            Err(AuthError::Unexpected)
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AccessContext {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let (Some(pool), Some(signer)) = (
            request.rocket().state::<SqlitePool>(),
            request.rocket().state::<TokenSigner>(),
        ) else {
            tracing::error!("Database pool or token signer not found in managed state");
            return reject(request, AuthError::Unexpected);
        };

        match resolve(pool, signer, request.headers().get_one("Authorization")).await {
            Ok(context) => Outcome::Success(context),
            Err(err) => reject(request, err),
        }
    }
}

fn reject(request: &Request<'_>, err: AuthError) -> Outcome<AccessContext, AuthError> {
    request.local_cache(|| RejectedCredential(Some(err)));
    Outcome::Error((err.status(), err))
}

#[catch(401)]
pub fn unauthorized_api(req: &Request) -> Custom<Json<ErrorResponse>> {
    let reason = req
        .local_cache(|| RejectedCredential(None))
        .0
        .unwrap_or(AuthError::Missing);

    tracing::warn!(reason = %reason, "Unauthorized access attempt");
    Custom(
        Status::Unauthorized,
        Json(ErrorResponse::new("unauthorized", &reason.to_string())),
    )
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    tracing::warn!("Forbidden access attempt");
    Custom(
        Status::Forbidden,
        Json(ErrorResponse::new(
            "forbidden",
            "You don't have permission to perform this action",
        )),
    )
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    Custom(
        Status::NotFound,
        Json(ErrorResponse::new("not_found", "Resource not found")),
    )
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    Custom(
        Status::BadRequest,
        Json(ErrorResponse::new("bad_request", "Bad request")),
    )
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    Custom(
        Status::BadRequest,
        Json(ErrorResponse::new(
            "bad_request",
            "Request body is missing required fields or is malformed",
        )),
    )
}

#[catch(500)]
pub fn internal_error_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    Custom(
        Status::InternalServerError,
        Json(ErrorResponse::new("internal_error", "Internal server error")),
    )
}
