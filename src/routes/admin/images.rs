use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    error::{AppError, DieselError, StdResponse},
    models::{CreateProductImageEntity, ProductImageEntity},
    schema::{product_images, products},
    state::AppState,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest(
            "/api/admin/products",
            OpenApiRouter::new().routes(utoipa_axum::routes!(add_image)),
        )
        .nest(
            "/api/admin/images",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(set_primary_image))
                .routes(utoipa_axum::routes!(delete_image)),
        )
}

#[derive(Deserialize, ToSchema)]
struct AddImageReq {
    pub url: String,
    pub position: Option<i32>,
    pub is_primary: Option<bool>,
}

/// Add an image to a product. A product's first image always becomes the
/// primary one; an explicit `is_primary` demotes the current primary.
#[utoipa::path(
    post,
    path = "/{id}/images",
    tags = ["Admin / Images"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID to attach the image to")
    ),
    responses(
        (status = 201, description = "Image added", body = StdResponse<ProductImageEntity, String>),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Product not found")
    )
)]
async fn add_image(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    axum::Json(body): axum::Json<AddImageReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.url.trim().is_empty() {
        return Err(AppError::invalid("url", "URL must not be empty"));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let image = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let product_exists: i64 = products::table
                    .find(id)
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to check product")?;
                if product_exists == 0 {
                    return Err(AppError::NotFound);
                }

                let existing: i64 = product_images::table
                    .filter(product_images::product_id.eq(id))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to count images")?;

                let is_primary = image_becomes_primary(existing, body.is_primary);
                if is_primary {
                    diesel::update(
                        product_images::table.filter(product_images::product_id.eq(id)),
                    )
                    .set(product_images::is_primary.eq(false))
                    .execute(conn)
                    .await
                    .context("Failed to demote current primary image")?;
                }

                let position = body
                    .position
                    .unwrap_or(i32::try_from(existing).unwrap_or(i32::MAX));

                let image: ProductImageEntity = diesel::insert_into(product_images::table)
                    .values(CreateProductImageEntity {
                        product_id: id,
                        url: body.url.trim().to_owned(),
                        position,
                        is_primary,
                    })
                    .returning(ProductImageEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to insert image")?;

                Ok::<ProductImageEntity, AppError>(image)
            })
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(image),
            message: Some("Image added successfully"),
        },
    ))
}

/// A product's first image is always primary, regardless of what the request
/// asked for; later images take the flag only on request. The caller demotes
/// the current primary before inserting when this returns true, so at most
/// one image per product carries the flag.
fn image_becomes_primary(existing_count: i64, requested: Option<bool>) -> bool {
    existing_count == 0 || requested.unwrap_or(false)
}

/// Flag one image as the product's primary image, demoting the rest.
#[utoipa::path(
    patch,
    path = "/{id}/primary",
    tags = ["Admin / Images"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Image ID to promote")
    ),
    responses(
        (status = 200, description = "Primary image updated", body = StdResponse<ProductImageEntity, String>),
        (status = 404, description = "Image not found")
    )
)]
async fn set_primary_image(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let image = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let image: QueryResult<ProductImageEntity> = product_images::table
                    .find(id)
                    .select(ProductImageEntity::as_select())
                    .get_result(conn)
                    .await;

                let image = match image {
                    Ok(image) => image,
                    Err(DieselError::NotFound) => return Err(AppError::NotFound),
                    Err(err) => return Err(AppError::Other(err.into())),
                };

                diesel::update(
                    product_images::table
                        .filter(product_images::product_id.eq(image.product_id)),
                )
                .set(product_images::is_primary.eq(false))
                .execute(conn)
                .await
                .context("Failed to demote current primary image")?;

                let image: ProductImageEntity =
                    diesel::update(product_images::table.find(image.id))
                        .set(product_images::is_primary.eq(true))
                        .returning(ProductImageEntity::as_returning())
                        .get_result(conn)
                        .await
                        .context("Failed to promote image")?;

                Ok::<ProductImageEntity, AppError>(image)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(image),
        message: Some("Primary image updated successfully"),
    })
}

/// Delete an image. Deleting the primary promotes the lowest-position
/// survivor so the product never loses its primary flag while images remain.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Admin / Images"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Image ID to delete")
    ),
    responses(
        (status = 200, description = "Image deleted", body = StdResponse<ProductImageEntity, String>),
        (status = 404, description = "Image not found")
    )
)]
async fn delete_image(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let image = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let image: QueryResult<ProductImageEntity> =
                    diesel::delete(product_images::table.find(id))
                        .returning(ProductImageEntity::as_returning())
                        .get_result(conn)
                        .await;

                let image = match image {
                    Ok(image) => image,
                    Err(DieselError::NotFound) => return Err(AppError::NotFound),
                    Err(err) => return Err(AppError::Other(err.into())),
                };

                if image.is_primary {
                    let survivor: Option<ProductImageEntity> = product_images::table
                        .filter(product_images::product_id.eq(image.product_id))
                        .order_by((product_images::position.asc(), product_images::id.asc()))
                        .select(ProductImageEntity::as_select())
                        .first(conn)
                        .await
                        .optional()
                        .context("Failed to find replacement primary image")?;

                    if let Some(survivor) = survivor {
                        diesel::update(product_images::table.find(survivor.id))
                            .set(product_images::is_primary.eq(true))
                            .execute(conn)
                            .await
                            .context("Failed to promote replacement primary image")?;
                    }
                }

                Ok::<ProductImageEntity, AppError>(image)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(image),
        message: Some("Image deleted successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::image_becomes_primary;

    #[test]
    fn first_image_is_forced_primary() {
        assert!(image_becomes_primary(0, None));
        assert!(image_becomes_primary(0, Some(false)));
    }

    #[test]
    fn later_images_are_primary_only_on_request() {
        assert!(!image_becomes_primary(3, None));
        assert!(!image_becomes_primary(3, Some(false)));
        assert!(image_becomes_primary(3, Some(true)));
    }
}
