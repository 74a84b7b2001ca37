use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{
    ExpressionMethods, QueryDsl, QueryResult, SelectableHelper,
    sql_types::{Integer, Nullable},
};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    error::{AppError, DieselError, StdResponse},
    models::{ProductEntity, ProductStockEntity},
    routes::{LimitQuery, clamp_limit},
    schema::{product_stock, products},
    state::AppState,
};

/// Alert threshold applied to products that never had one configured.
const DEFAULT_STOCK_MINIMUM: i32 = 5;
const ALERTS_DEFAULT_LIMIT: i64 = 20;
const ALERTS_MAX_LIMIT: i64 = 100;

diesel::define_sql_function! {
    #[sql_name = "COALESCE"]
    fn coalesce(threshold: Nullable<Integer>, fallback: Integer) -> Integer;
}

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest(
            "/api/admin/stock",
            OpenApiRouter::new().routes(utoipa_axum::routes!(get_stock_alerts)),
        )
        .nest(
            "/api/admin/products",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_product_stock))
                .routes(utoipa_axum::routes!(put_product_stock)),
        )
}

/// Products at or below their alert threshold, most deficient first.
/// Products without a configured `estoque_minimo` use the default of 5.
#[utoipa::path(
    get,
    path = "/alerts",
    tags = ["Admin / Stock"],
    security(("bearerAuth" = [])),
    params(LimitQuery),
    responses(
        (status = 200, description = "Stock alerts", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_stock_alerts(
    Query(query): Query<LimitQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let limit = clamp_limit(query.limit, ALERTS_DEFAULT_LIMIT, ALERTS_MAX_LIMIT);

    let items: Vec<ProductEntity> = products::table
        .filter(products::estoque.le(coalesce(products::estoque_minimo, DEFAULT_STOCK_MINIMUM)))
        .order_by(
            (products::estoque - coalesce(products::estoque_minimo, DEFAULT_STOCK_MINIMUM)).asc(),
        )
        .limit(limit)
        .select(ProductEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get stock alerts")?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get stock alerts successfully"),
    })
}

/// Per-location stock rows of one product.
#[utoipa::path(
    get,
    path = "/{id}/stock",
    tags = ["Admin / Stock"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Per-location stock", body = StdResponse<Vec<ProductStockEntity>, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn get_product_stock(
    Path(id): Path<i32>,
    State(state): State<AppState>,
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

    let rows: Vec<ProductStockEntity> = product_stock::table
        .filter(product_stock::product_id.eq(id))
        .order_by(product_stock::location.asc())
        .select(ProductStockEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get product stock")?;

    Ok(StdResponse {
        data: Some(rows),
        message: Some("Get product stock successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct PutStockReq {
    pub location: String,
    pub quantity: i32,
}

#[derive(Serialize, ToSchema)]
struct PutStockRes {
    pub stock: ProductStockEntity,
    pub product: ProductEntity,
}

/// Write stock for one (product, location) pair. The per-location row is
/// upserted and the new quantity is unconditionally mirrored into the legacy
/// `estoque` scalar; any write path that skips this mirror lets the two
/// drift. Quantity is clamped to zero from below.
#[utoipa::path(
    put,
    path = "/{id}/stock",
    tags = ["Admin / Stock"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Stock updated", body = StdResponse<PutStockRes, String>),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Product not found")
    )
)]
async fn put_product_stock(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    axum::Json(body): axum::Json<PutStockReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.location.trim().is_empty() {
        return Err(AppError::invalid("location", "Location must not be empty"));
    }
    let quantity = clamp_stock_quantity(body.quantity);
    let location = body.location.trim().to_owned();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (stock, product) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let product: QueryResult<ProductEntity> =
                    diesel::update(products::table.find(id))
                        .set((
                            products::estoque.eq(quantity),
                            products::updated_at.eq(diesel::dsl::now),
                        ))
                        .returning(ProductEntity::as_returning())
                        .get_result(conn)
                        .await;

                let product = match product {
                    Ok(product) => product,
                    Err(DieselError::NotFound) => return Err(AppError::NotFound),
                    Err(err) => return Err(AppError::Other(err.into())),
                };

                let stock: ProductStockEntity = diesel::insert_into(product_stock::table)
                    .values((
                        product_stock::product_id.eq(id),
                        product_stock::location.eq(&location),
                        product_stock::quantity.eq(quantity),
                    ))
                    .on_conflict((product_stock::product_id, product_stock::location))
                    .do_update()
                    .set((
                        product_stock::quantity.eq(quantity),
                        product_stock::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(ProductStockEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to upsert stock row")?;

                Ok::<(ProductStockEntity, ProductEntity), AppError>((stock, product))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(PutStockRes { stock, product }),
        message: Some("Stock updated successfully"),
    })
}

/// Stock can sell out but never go negative.
fn clamp_stock_quantity(quantity: i32) -> i32 {
    quantity.max(0)
}

#[cfg(test)]
mod tests {
    use super::clamp_stock_quantity;

    #[test]
    fn quantity_clamps_at_zero() {
        assert_eq!(clamp_stock_quantity(-10), 0);
        assert_eq!(clamp_stock_quantity(0), 0);
        assert_eq!(clamp_stock_quantity(42), 42);
    }
}
