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
    models::{CreateTagEntity, TagEntity},
    schema::{product_tags, products, tags},
    state::AppState,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest(
            "/api/admin/tags",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_tags))
                .routes(utoipa_axum::routes!(create_tag))
                .routes(utoipa_axum::routes!(delete_tag)),
        )
        .nest(
            "/api/admin/products",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(attach_tag))
                .routes(utoipa_axum::routes!(detach_tag)),
        )
}

/// List all tags.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Admin / Tags"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List tags", body = StdResponse<Vec<TagEntity>, String>)
    )
)]
async fn get_tags(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let items: Vec<TagEntity> = tags::table
        .order_by(tags::name.asc())
        .select(TagEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to list tags")?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get tags successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateTagReq {
    pub name: String,
}

/// Create a tag. Tag names are unique.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Admin / Tags"],
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Tag created", body = StdResponse<TagEntity, String>),
        (status = 400, description = "Validation failed or duplicate name")
    )
)]
async fn create_tag(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<CreateTagReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::invalid("name", "Name must not be empty"));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tag: QueryResult<TagEntity> = diesel::insert_into(tags::table)
        .values(CreateTagEntity {
            name: body.name.trim().to_owned(),
        })
        .returning(TagEntity::as_returning())
        .get_result(conn)
        .await;

    let tag = match tag {
        Ok(tag) => tag,
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::invalid("name", "Tag already exists"));
        }
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(tag),
            message: Some("Tag created successfully"),
        },
    ))
}

/// Delete a tag. Junction rows cascade away.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Admin / Tags"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Tag ID to delete")
    ),
    responses(
        (status = 200, description = "Tag deleted", body = StdResponse<TagEntity, String>),
        (status = 404, description = "Tag not found")
    )
)]
async fn delete_tag(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tag: QueryResult<TagEntity> = diesel::delete(tags::table.find(id))
        .returning(TagEntity::as_returning())
        .get_result(conn)
        .await;

    match tag {
        Ok(tag) => Ok(StdResponse {
            data: Some(tag),
            message: Some("Tag deleted successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

#[derive(Deserialize, ToSchema)]
struct AttachTagReq {
    pub tag_id: i32,
}

/// Attach a tag to a product. Attaching the same tag twice is a no-op thanks
/// to the (product, tag) uniqueness constraint.
#[utoipa::path(
    post,
    path = "/{id}/tags",
    tags = ["Admin / Tags"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID to tag")
    ),
    responses(
        (status = 200, description = "Tag attached", body = StdResponse<Vec<TagEntity>, String>),
        (status = 400, description = "Unknown tag"),
        (status = 404, description = "Product not found")
    )
)]
async fn attach_tag(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    axum::Json(body): axum::Json<AttachTagReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product_exists: i64 = products::table
        .find(id)
        .count()
        .get_result(conn)
        .await
        .context("Failed to check product")?;
    if product_exists == 0 {
        return Err(AppError::NotFound);
    }

    let tag_exists: i64 = tags::table
        .find(body.tag_id)
        .count()
        .get_result(conn)
        .await
        .context("Failed to check tag")?;
    if tag_exists == 0 {
        return Err(AppError::invalid("tag_id", "Unknown tag"));
    }

    diesel::insert_into(product_tags::table)
        .values((
            product_tags::product_id.eq(id),
            product_tags::tag_id.eq(body.tag_id),
        ))
        .on_conflict((product_tags::product_id, product_tags::tag_id))
        .do_nothing()
        .execute(conn)
        .await
        .context("Failed to attach tag")?;

    let attached: Vec<TagEntity> = tags::table
        .inner_join(product_tags::table)
        .filter(product_tags::product_id.eq(id))
        .order_by(tags::name.asc())
        .select(TagEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get product tags")?;

    Ok(StdResponse {
        data: Some(attached),
        message: Some("Tag attached successfully"),
    })
}

/// Detach a tag from a product.
#[utoipa::path(
    delete,
    path = "/{id}/tags/{tag_id}",
    tags = ["Admin / Tags"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID"),
        ("tag_id" = i32, Path, description = "Tag ID to detach")
    ),
    responses(
        (status = 204, description = "Tag detached"),
        (status = 404, description = "Product was not tagged with this tag")
    )
)]
async fn detach_tag(
    Path((id, tag_id)): Path<(i32, i32)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = diesel::delete(
        product_tags::table
            .filter(product_tags::product_id.eq(id))
            .filter(product_tags::tag_id.eq(tag_id)),
    )
    .execute(conn)
    .await
    .context("Failed to detach tag")?;

    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}
