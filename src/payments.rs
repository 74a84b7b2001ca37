use std::time::Duration;

use anyhow::{Context, Result};
use diesel::ExpressionMethods;
use diesel_async::RunQueryDsl;
use tracing::{error, info};

use crate::{schema::orders, state::AppState};

pub const STATUS_PAYMENT_PENDING: &str = "PAYMENT_PENDING";
pub const STATUS_PAID: &str = "PAID";

const SETTLEMENT_DELAY: Duration = Duration::from_secs(3);

/// Simulated payment provider: after a short delay the order is marked as
/// paid and the settlement is logged. There is no idempotency key, retry, or
/// external processor behind this.
pub fn schedule_mock_payment(state: AppState, order_id: i32) {
    tokio::spawn(async move {
        tokio::time::sleep(SETTLEMENT_DELAY).await;
        match settle(&state, order_id).await {
            Ok(true) => info!("Payment for order #{} settled", order_id),
            Ok(false) => info!(
                "Payment for order #{} skipped, order is no longer pending",
                order_id
            ),
            Err(err) => error!("Failed to settle payment for order #{}: {err:#}", order_id),
        }
    });
}

async fn settle(state: &AppState, order_id: i32) -> Result<bool> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated = diesel::update(orders::table)
        .filter(orders::id.eq(order_id))
        .filter(orders::status.eq(STATUS_PAYMENT_PENDING))
        .set((
            orders::status.eq(STATUS_PAID),
            orders::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .context("Failed to update order status")?;

    Ok(updated > 0)
}
