use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{
    ExpressionMethods, QueryDsl, QueryResult, SelectableHelper, result::DatabaseErrorKind,
};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    error::{AppError, DieselError, StdResponse},
    models::{CategoryEntity, CreateCategoryEntity, UpdateCategoryEntity},
    schema::categories,
    state::AppState,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/admin/categories",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_category))
            .routes(utoipa_axum::routes!(update_category))
            .routes(utoipa_axum::routes!(delete_category)),
    )
}

#[derive(Deserialize, ToSchema)]
struct CreateCategoryReq {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
}

/// Create a category, optionally as a child of an existing one.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Admin / Categories"],
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Category created", body = StdResponse<CategoryEntity, String>),
        (status = 400, description = "Validation failed")
    )
)]
async fn create_category(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<CreateCategoryReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::invalid("name", "Name must not be empty"));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    if let Some(parent_id) = body.parent_id {
        let parent_exists: i64 = categories::table
            .find(parent_id)
            .count()
            .get_result(conn)
            .await
            .context("Failed to check parent category")?;
        if parent_exists == 0 {
            return Err(AppError::invalid("parent_id", "Unknown parent category"));
        }
    }

    let category: CategoryEntity = diesel::insert_into(categories::table)
        .values(CreateCategoryEntity {
            name: body.name.trim().to_owned(),
            description: body.description,
            parent_id: body.parent_id,
        })
        .returning(CategoryEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create category")?;

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(category),
            message: Some("Category created successfully"),
        },
    ))
}

/// Partially update a category.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Admin / Categories"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Category ID to update")
    ),
    responses(
        (status = 200, description = "Category updated", body = StdResponse<CategoryEntity, String>),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Category not found")
    )
)]
async fn update_category(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    axum::Json(body): axum::Json<UpdateCategoryEntity>,
) -> Result<impl IntoResponse, AppError> {
    if !body.has_changes() {
        return Err(AppError::invalid("body", "No fields to update"));
    }
    if body.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::invalid("name", "Name must not be empty"));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    if let Some(parent_id) = body.parent_id {
        if parent_id == id {
            return Err(AppError::invalid(
                "parent_id",
                "Category cannot be its own parent",
            ));
        }
        let parent_exists: i64 = categories::table
            .find(parent_id)
            .count()
            .get_result(conn)
            .await
            .context("Failed to check parent category")?;
        if parent_exists == 0 {
            return Err(AppError::invalid("parent_id", "Unknown parent category"));
        }
    }

    let category: QueryResult<CategoryEntity> = diesel::update(categories::table.find(id))
        .set((&body, categories::updated_at.eq(diesel::dsl::now)))
        .returning(CategoryEntity::as_returning())
        .get_result(conn)
        .await;

    match category {
        Ok(category) => Ok(StdResponse {
            data: Some(category),
            message: Some("Category updated successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Delete a category. Categories still referenced by products or child
/// categories are protected.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Admin / Categories"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Category ID to delete")
    ),
    responses(
        (status = 200, description = "Category deleted", body = StdResponse<CategoryEntity, String>),
        (status = 400, description = "Category still in use"),
        (status = 404, description = "Category not found")
    )
)]
async fn delete_category(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let category: QueryResult<CategoryEntity> = diesel::delete(categories::table.find(id))
        .returning(CategoryEntity::as_returning())
        .get_result(conn)
        .await;

    match category {
        Ok(category) => Ok(StdResponse {
            data: Some(category),
            message: Some("Category deleted successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)) => {
            Err(AppError::invalid(
                "id",
                "Category still has products or child categories",
            ))
        }
        Err(err) => Err(AppError::Other(err.into())),
    }
}
