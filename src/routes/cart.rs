use anyhow::{Context, Result};
use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    error::{AppError, DieselError, StdResponse},
    middleware::{self, CurrentUser},
    models::{CartItemEntity, ProductEntity},
    schema::{cart_items, products},
    state::AppState,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/cart",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_cart))
            .routes(utoipa_axum::routes!(add_cart_item))
            .routes(utoipa_axum::routes!(clear_cart))
            .routes(utoipa_axum::routes!(update_cart_item))
            .routes(utoipa_axum::routes!(remove_cart_item))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::customer_authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
struct CartLine {
    pub item: CartItemEntity,
    pub product: ProductEntity,
    pub line_total: f64,
}

#[derive(Serialize, ToSchema)]
struct GetCartRes {
    pub items: Vec<CartLine>,
    pub total_price: f64,
}

/// Fetch the authenticated user's cart with per-line and overall totals.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<GetCartRes, String>)
    )
)]
async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rows: Vec<(CartItemEntity, ProductEntity)> = cart_items::table
        .inner_join(products::table)
        .filter(cart_items::user_id.eq(user.id))
        .order_by(cart_items::created_at.asc())
        .select((CartItemEntity::as_select(), ProductEntity::as_select()))
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    let items: Vec<CartLine> = rows
        .into_iter()
        .map(|(item, product)| {
            let line_total = product.effective_price() * f64::from(item.quantity);
            CartLine {
                item,
                product,
                line_total,
            }
        })
        .collect();
    let total_price: f64 = items.iter().map(|line| line.line_total).sum();

    Ok(StdResponse {
        data: Some(GetCartRes { items, total_price }),
        message: Some("Get cart successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct AddCartItemReq {
    pub product_id: i32,
    pub quantity: i32,
}

/// Put a product in the cart. Adding a product that is already there
/// increments its quantity instead of inserting a duplicate row.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Cart item upserted", body = StdResponse<CartItemEntity, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn add_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    axum::Json(body): axum::Json<AddCartItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product_exists: i64 = products::table
        .find(body.product_id)
        .count()
        .get_result(conn)
        .await
        .context("Failed to check product")?;
    if product_exists == 0 {
        return Err(AppError::NotFound);
    }

    let quantity = floor_quantity(body.quantity);

    let item: CartItemEntity = diesel::insert_into(cart_items::table)
        .values((
            cart_items::user_id.eq(user.id),
            cart_items::product_id.eq(body.product_id),
            cart_items::quantity.eq(quantity),
        ))
        .on_conflict((cart_items::user_id, cart_items::product_id))
        .do_update()
        .set((
            cart_items::quantity.eq(cart_items::quantity + quantity),
            cart_items::updated_at.eq(diesel::dsl::now),
        ))
        .returning(CartItemEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to upsert cart item")?;

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(item),
            message: Some("Cart item added successfully"),
        },
    ))
}

#[derive(Deserialize, ToSchema)]
struct UpdateCartItemReq {
    pub quantity: i32,
}

/// Set the quantity of a product already in the cart.
#[utoipa::path(
    patch,
    path = "/{product_id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product whose cart line to update")
    ),
    responses(
        (status = 200, description = "Cart item updated", body = StdResponse<CartItemEntity, String>),
        (status = 404, description = "Product not in cart")
    )
)]
async fn update_cart_item(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    axum::Json(body): axum::Json<UpdateCartItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let item: QueryResult<CartItemEntity> =
        diesel::update(cart_items::table.find((user.id, product_id)))
            .set((
                cart_items::quantity.eq(floor_quantity(body.quantity)),
                cart_items::updated_at.eq(diesel::dsl::now),
            ))
            .returning(CartItemEntity::as_returning())
            .get_result(conn)
            .await;

    match item {
        Ok(item) => Ok(StdResponse {
            data: Some(item),
            message: Some("Cart item updated successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Remove one product from the cart.
#[utoipa::path(
    delete,
    path = "/{product_id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product whose cart line to remove")
    ),
    responses(
        (status = 200, description = "Cart item removed", body = StdResponse<CartItemEntity, String>),
        (status = 404, description = "Product not in cart")
    )
)]
async fn remove_cart_item(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let item: QueryResult<CartItemEntity> =
        diesel::delete(cart_items::table.find((user.id, product_id)))
            .returning(CartItemEntity::as_returning())
            .get_result(conn)
            .await;

    match item {
        Ok(item) => Ok(StdResponse {
            data: Some(item),
            message: Some("Cart item removed successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Empty the cart.
#[utoipa::path(
    delete,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "Cart cleared")
    )
)]
async fn clear_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    diesel::delete(cart_items::table.filter(cart_items::user_id.eq(user.id)))
        .execute(conn)
        .await
        .context("Failed to clear cart")?;

    Ok(StatusCode::NO_CONTENT)
}

/// Cart quantities never drop below one; zero or negative requests mean "one".
fn floor_quantity(quantity: i32) -> i32 {
    quantity.max(1)
}

#[cfg(test)]
mod tests {
    use super::floor_quantity;

    #[test]
    fn quantity_floors_at_one() {
        assert_eq!(floor_quantity(-5), 1);
        assert_eq!(floor_quantity(0), 1);
        assert_eq!(floor_quantity(1), 1);
        assert_eq!(floor_quantity(7), 7);
    }
}
