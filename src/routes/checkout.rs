use anyhow::Context;
use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    error::{AppError, StdResponse},
    middleware::{self, CurrentUser},
    models::{
        CartItemEntity, CreateOrderEntity, CreateOrderItemEntity, OrderEntity, OrderItemEntity,
        ProductEntity,
    },
    payments::{self, STATUS_PAYMENT_PENDING},
    schema::{cart_items, order_items, orders, products},
    state::AppState,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/checkout",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(checkout))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::customer_authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
struct CheckoutRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

/// Turn the cart into an order. Order lines snapshot each product's current
/// effective price; the whole sequence (read cart, create order, insert
/// lines, bump sales counters, clear cart) runs in one transaction. Payment
/// settlement is simulated after commit.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Checkout"],
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Order created", body = StdResponse<CheckoutRes, String>),
        (status = 400, description = "Cart is empty")
    )
)]
async fn checkout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id = user.id;
    let (order, order_items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let rows: Vec<(CartItemEntity, ProductEntity)> = cart_items::table
                    .inner_join(products::table)
                    .filter(cart_items::user_id.eq(user_id))
                    .select((CartItemEntity::as_select(), ProductEntity::as_select()))
                    .get_results(conn)
                    .await
                    .context("Failed to get cart items")?;

                if rows.is_empty() {
                    return Err(AppError::invalid("cart", "Cart is empty"));
                }

                let total = order_total(
                    rows.iter()
                        .map(|(item, product)| (product.effective_price(), item.quantity)),
                );

                let order: OrderEntity = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        user_id,
                        status: STATUS_PAYMENT_PENDING.to_owned(),
                        total,
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let lines: Vec<CreateOrderItemEntity> = rows
                    .iter()
                    .map(|(item, product)| CreateOrderItemEntity {
                        order_id: order.id,
                        product_id: item.product_id,
                        quantity: item.quantity,
                        unit_price: product.effective_price(),
                    })
                    .collect();

                let order_items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                    .values(lines)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create order items")?;

                for (item, _) in &rows {
                    diesel::update(products::table.find(item.product_id))
                        .set(products::sales_count.eq(products::sales_count + item.quantity))
                        .execute(conn)
                        .await
                        .context("Failed to bump sales count")?;
                }

                diesel::delete(cart_items::table.filter(cart_items::user_id.eq(user_id)))
                    .execute(conn)
                    .await
                    .context("Failed to clear cart")?;

                Ok::<(OrderEntity, Vec<OrderItemEntity>), AppError>((order, order_items))
            })
        })
        .await?;

    payments::schedule_mock_payment(state.clone(), order.id);

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(CheckoutRes { order, order_items }),
            message: Some("Order created successfully"),
        },
    ))
}

fn order_total(lines: impl Iterator<Item = (f64, i32)>) -> f64 {
    lines
        .map(|(unit_price, quantity)| unit_price * f64::from(quantity))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::order_total;

    #[test]
    fn total_sums_price_times_quantity() {
        let total = order_total(vec![(10.0, 2), (4.5, 3)].into_iter());
        assert_eq!(total, 33.5);
    }

    #[test]
    fn empty_iterator_totals_zero() {
        assert_eq!(order_total(std::iter::empty()), 0.0);
    }
}
