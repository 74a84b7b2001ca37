use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    error::{AppError, DieselError, StdResponse},
    models::CategoryEntity,
    schema::categories,
    state::AppState,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/categories",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_categories))
            .routes(utoipa_axum::routes!(get_category)),
    )
}

/// List all categories. The parent/child tree is flat here; clients rebuild
/// it from `parent_id`.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Categories"],
    responses(
        (status = 200, description = "List categories", body = StdResponse<Vec<CategoryEntity>, String>)
    )
)]
async fn get_categories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let items: Vec<CategoryEntity> = categories::table
        .order_by(categories::name.asc())
        .select(CategoryEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to list categories")?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get categories successfully"),
    })
}

#[derive(Serialize, ToSchema)]
struct GetCategoryRes {
    pub category: CategoryEntity,
    pub children: Vec<CategoryEntity>,
}

/// Fetch one category together with its direct children.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Categories"],
    params(
        ("id" = i32, Path, description = "Category ID to fetch")
    ),
    responses(
        (status = 200, description = "Get category successfully", body = StdResponse<GetCategoryRes, String>),
        (status = 404, description = "Category not found")
    )
)]
async fn get_category(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let category: QueryResult<CategoryEntity> = categories::table
        .find(id)
        .select(CategoryEntity::as_select())
        .get_result(conn)
        .await;

    let category = match category {
        Ok(category) => category,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let children: Vec<CategoryEntity> = categories::table
        .filter(categories::parent_id.eq(category.id))
        .order_by(categories::name.asc())
        .select(CategoryEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get child categories")?;

    Ok(StdResponse {
        data: Some(GetCategoryRes { category, children }),
        message: Some("Get category successfully"),
    })
}
