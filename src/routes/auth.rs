use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use diesel::{
    ExpressionMethods, QueryDsl, QueryResult, SelectableHelper,
    result::DatabaseErrorKind,
};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    error::{AppError, DieselError, FieldError, StdResponse},
    middleware::{self, CurrentUser, ROLE_CUSTOMER},
    models::{CreateSessionEntity, CreateUserEntity, SessionEntity, UserEntity},
    schema::{sessions, users},
    state::AppState,
};

const MIN_PASSWORD_LENGTH: usize = 8;
const SESSION_TTL_DAYS: i64 = 30;

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/auth",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(register))
            .routes(utoipa_axum::routes!(login))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(logout))
                    .routes(utoipa_axum::routes!(me))
                    .route_layer(axum::middleware::from_fn_with_state(
                        state,
                        middleware::customer_authorization,
                    )),
            ),
    )
}

#[derive(Deserialize, ToSchema)]
struct RegisterReq {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Register a new customer account.
#[utoipa::path(
    post,
    path = "/register",
    tags = ["Auth"],
    responses(
        (status = 201, description = "Account created", body = StdResponse<UserEntity, String>),
        (status = 400, description = "Validation failed or email already registered")
    )
)]
async fn register(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<RegisterReq>,
) -> Result<impl IntoResponse, AppError> {
    let errors = validate_registration(&body.name, &body.email, &body.password);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let password_hash = hash_password(&body.password)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: QueryResult<UserEntity> = diesel::insert_into(users::table)
        .values(CreateUserEntity {
            name: body.name.trim().to_owned(),
            email: body.email.trim().to_lowercase(),
            password_hash,
            role: ROLE_CUSTOMER.to_owned(),
        })
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await;

    let user = match user {
        Ok(user) => user,
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::invalid("email", "Email is already registered"));
        }
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(user),
            message: Some("Account created successfully"),
        },
    ))
}

#[derive(Deserialize, ToSchema)]
struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
struct LoginRes {
    pub token: Uuid,
    pub expires_at: chrono::DateTime<Utc>,
    pub user: UserEntity,
}

/// Exchange credentials for a bearer session token.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Auth"],
    responses(
        (status = 200, description = "Logged in", body = StdResponse<LoginRes, String>),
        (status = 401, description = "Unknown email or wrong password")
    )
)]
async fn login(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: QueryResult<UserEntity> = users::table
        .filter(users::email.eq(body.email.trim().to_lowercase()))
        .select(UserEntity::as_select())
        .get_result(conn)
        .await;

    let user = match user {
        Ok(user) => user,
        Err(DieselError::NotFound) => return Err(AppError::Unauthorized),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if !verify_password(&body.password, &user.password_hash) {
        return Err(AppError::Unauthorized);
    }

    let session: SessionEntity = diesel::insert_into(sessions::table)
        .values(CreateSessionEntity {
            token: Uuid::new_v4(),
            user_id: user.id,
            expires_at: Utc::now() + Duration::days(SESSION_TTL_DAYS),
        })
        .returning(SessionEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create session")?;

    Ok(StdResponse {
        data: Some(LoginRes {
            token: session.token,
            expires_at: session.expires_at,
            user,
        }),
        message: Some("Logged in successfully"),
    })
}

/// Invalidate the current session token.
#[utoipa::path(
    post,
    path = "/logout",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "Session removed"),
        (status = 401, description = "Not authenticated")
    )
)]
async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    diesel::delete(sessions::table.find(user.session_token))
        .execute(conn)
        .await
        .context("Failed to delete session")?;

    Ok(StatusCode::NO_CONTENT)
}

/// Fetch the authenticated user's own profile.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user", body = StdResponse<UserEntity, String>),
        (status = 401, description = "Not authenticated")
    )
)]
async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: UserEntity = users::table
        .find(user.id)
        .select(UserEntity::as_select())
        .get_result(conn)
        .await
        .context("Failed to get current user")?;

    Ok(StdResponse {
        data: Some(user),
        message: Some("Get current user successfully"),
    })
}

fn validate_registration(name: &str, email: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(FieldError::new("name", "Name must not be empty"));
    }

    let email = email.trim();
    if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.push(FieldError::new("email", "Email address is invalid"));
    }

    if password.len() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }

    errors
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Other(anyhow!("Failed to hash password: {err}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_registration() {
        assert!(validate_registration("Ana", "ana@example.com", "correct horse").is_empty());
    }

    #[test]
    fn rejects_blank_name_and_bad_email() {
        let errors = validate_registration("  ", "not-an-email", "long enough pw");
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "email"]);
    }

    #[test]
    fn rejects_short_password() {
        let errors = validate_registration("Ana", "ana@example.com", "short");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "password");
    }

    #[test]
    fn password_round_trips_through_argon2() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
