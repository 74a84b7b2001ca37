use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
// prelude pulls in PgTextExpressionMethods for `ilike`
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    error::{AppError, DieselError, StdResponse},
    models::{ProductEntity, ProductImageEntity, TagEntity},
    routes::{LimitQuery, clamp_limit},
    schema::{product_images, product_tags, products, tags},
    state::AppState,
};

const RELATED_DEFAULT_LIMIT: i64 = 6;
const RELATED_MAX_LIMIT: i64 = 24;
const SHOWCASE_DEFAULT_LIMIT: i64 = 8;
const LIST_DEFAULT_LIMIT: i64 = 20;
const LIST_MAX_LIMIT: i64 = 100;

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/products",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_products))
            .routes(utoipa_axum::routes!(get_bestsellers))
            .routes(utoipa_axum::routes!(get_featured))
            .routes(utoipa_axum::routes!(get_product))
            .routes(utoipa_axum::routes!(get_related_products)),
    )
}

#[derive(Deserialize, IntoParams)]
struct ListProductsQuery {
    /// Restrict to one category.
    category: Option<i32>,
    /// Case-insensitive name search.
    q: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// List products, optionally filtered by category and name search.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Products"],
    params(ListProductsQuery),
    responses(
        (status = 200, description = "List products", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_products(
    Query(query): Query<ListProductsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut list = products::table
        .select(ProductEntity::as_select())
        .into_boxed();

    if let Some(category_id) = query.category {
        list = list.filter(products::category_id.eq(category_id));
    }
    if let Some(q) = query.q.filter(|q| !q.trim().is_empty()) {
        list = list.filter(products::name.ilike(format!("%{}%", q.trim())));
    }

    let limit = clamp_limit(query.limit, LIST_DEFAULT_LIMIT, LIST_MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let items: Vec<ProductEntity> = list
        .order_by(products::created_at.desc())
        .limit(limit)
        .offset(offset)
        .get_results(conn)
        .await
        .context("Failed to list products")?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get products successfully"),
    })
}

#[derive(Serialize, ToSchema)]
struct GetProductRes {
    pub product: ProductEntity,
    pub images: Vec<ProductImageEntity>,
    pub tags: Vec<TagEntity>,
}

/// Fetch one product with its images (position order) and tags.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Products"],
    params(
        ("id" = i32, Path, description = "Product ID to fetch")
    ),
    responses(
        (status = 200, description = "Get product successfully", body = StdResponse<GetProductRes, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn get_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: QueryResult<ProductEntity> = products::table
        .find(id)
        .select(ProductEntity::as_select())
        .get_result(conn)
        .await;

    let product = match product {
        Ok(product) => product,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let images: Vec<ProductImageEntity> = product_images::table
        .filter(product_images::product_id.eq(product.id))
        .order_by(product_images::position.asc())
        .select(ProductImageEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get product images")?;

    let tags: Vec<TagEntity> = tags::table
        .inner_join(product_tags::table)
        .filter(product_tags::product_id.eq(product.id))
        .select(TagEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get product tags")?;

    Ok(StdResponse {
        data: Some(GetProductRes {
            product,
            images,
            tags,
        }),
        message: Some("Get product successfully"),
    })
}

/// Products from the same category, best rated first, ties broken by sales.
/// The product itself is never part of its own recommendations.
#[utoipa::path(
    get,
    path = "/{id}/related",
    tags = ["Products"],
    params(
        ("id" = i32, Path, description = "Product ID to recommend around"),
        LimitQuery
    ),
    responses(
        (status = 200, description = "Related products", body = StdResponse<Vec<ProductEntity>, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn get_related_products(
    Path(id): Path<i32>,
    Query(query): Query<LimitQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: QueryResult<ProductEntity> = products::table
        .find(id)
        .select(ProductEntity::as_select())
        .get_result(conn)
        .await;

    let product = match product {
        Ok(product) => product,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let limit = clamp_limit(query.limit, RELATED_DEFAULT_LIMIT, RELATED_MAX_LIMIT);

    let related: Vec<ProductEntity> = products::table
        .filter(products::category_id.eq(product.category_id))
        .filter(products::id.ne(product.id))
        .order_by((products::rating.desc(), products::sales_count.desc()))
        .limit(limit)
        .select(ProductEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get related products")?;

    Ok(StdResponse {
        data: Some(related),
        message: Some("Get related products successfully"),
    })
}

/// Best-selling products across the whole catalog.
#[utoipa::path(
    get,
    path = "/bestsellers",
    tags = ["Products"],
    params(LimitQuery),
    responses(
        (status = 200, description = "Bestselling products", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_bestsellers(
    Query(query): Query<LimitQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let limit = clamp_limit(query.limit, SHOWCASE_DEFAULT_LIMIT, RELATED_MAX_LIMIT);

    let items: Vec<ProductEntity> = products::table
        .order_by((products::sales_count.desc(), products::rating.desc()))
        .limit(limit)
        .select(ProductEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get bestsellers")?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get bestsellers successfully"),
    })
}

/// Products flagged for the storefront highlight shelf.
#[utoipa::path(
    get,
    path = "/featured",
    tags = ["Products"],
    params(LimitQuery),
    responses(
        (status = 200, description = "Featured products", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_featured(
    Query(query): Query<LimitQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let limit = clamp_limit(query.limit, SHOWCASE_DEFAULT_LIMIT, RELATED_MAX_LIMIT);

    let items: Vec<ProductEntity> = products::table
        .filter(products::featured.eq(true))
        .order_by(products::rating.desc())
        .limit(limit)
        .select(ProductEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get featured products")?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get featured products successfully"),
    })
}
