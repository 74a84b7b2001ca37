use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::{
    error::{AppError, DieselError},
    models::{SessionEntity, UserEntity},
    schema::{sessions, users},
    state::AppState,
};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CUSTOMER: &str = "customer";

/// Authenticated identity attached to the request extensions.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i32,
    pub role: String,
    pub session_token: Uuid,
}

/// Require a valid bearer session. Attaches [`CurrentUser`].
pub async fn customer_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Require a valid bearer session belonging to an admin user.
pub async fn admin_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers()).await?;
    if user.role != ROLE_ADMIN {
        return Err(AppError::Forbidden);
    }
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .ok_or(AppError::Unauthorized)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let result: QueryResult<(SessionEntity, UserEntity)> = sessions::table
        .inner_join(users::table)
        .filter(sessions::token.eq(token))
        .select((SessionEntity::as_select(), UserEntity::as_select()))
        .get_result(conn)
        .await;

    let (session, user) = match result {
        Ok(found) => found,
        Err(DieselError::NotFound) => return Err(AppError::Unauthorized),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    if session.expires_at < Utc::now() {
        diesel::delete(sessions::table.find(session.token))
            .execute(conn)
            .await
            .context("Failed to delete expired session")?;
        return Err(AppError::Unauthorized);
    }

    Ok(CurrentUser {
        id: user.id,
        role: user.role,
        session_token: session.token,
    })
}

fn parse_bearer_token(header: &str) -> Option<Uuid> {
    let token = header.strip_prefix("Bearer ")?;
    Uuid::parse_str(token.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_bearer_header() {
        let token = Uuid::new_v4();
        let header = format!("Bearer {token}");
        assert_eq!(parse_bearer_token(&header), Some(token));
    }

    #[test]
    fn rejects_missing_scheme() {
        let token = Uuid::new_v4().to_string();
        assert_eq!(parse_bearer_token(&token), None);
    }

    #[test]
    fn rejects_garbage_token() {
        assert_eq!(parse_bearer_token("Bearer not-a-uuid"), None);
    }
}
