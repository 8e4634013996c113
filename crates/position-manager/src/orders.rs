use alert_core::Position;
use broker_trait::{ExecutionError, ExecutionVenue, OrderInfo, OrderSide, OrderStatus};
use std::time::Duration;

use crate::models::ExecutorError;

/// Retry schedule in seconds, cut short by the fill timeout.
const FILL_RETRY_DELAYS: [u64; 5] = [1, 2, 4, 8, 15];

/// Poll an order with backoff until it fills, dies, or the timeout elapses.
pub(crate) async fn wait_for_fill(
    venue: &dyn ExecutionVenue,
    order: OrderInfo,
    timeout: Duration,
) -> Result<OrderInfo, ExecutorError> {
    if order.is_filled() {
        return Ok(order);
    }

    let order_id = order.order_id;
    let mut status = order.status;
    let mut waited = Duration::ZERO;

    for (i, secs) in FILL_RETRY_DELAYS.iter().enumerate() {
        let delay = Duration::from_secs(*secs).min(timeout.saturating_sub(waited));
        if delay.is_zero() {
            break;
        }
        tokio::time::sleep(delay).await;
        waited += delay;

        let order = venue.get_order(&order_id).await?;
        status = order.status;
        match order.status {
            OrderStatus::Filled => {
                tracing::info!(
                    "Order {} filled: {} @ {}",
                    order_id,
                    order.quantity,
                    order.fill_price.unwrap_or_default()
                );
                return Ok(order);
            }
            OrderStatus::Cancelled | OrderStatus::Rejected => {
                return Err(ExecutorError::OrderNotFilled(order_id, order.status));
            }
            OrderStatus::Pending => {
                tracing::debug!(
                    "Order {} still pending (attempt {}/{})",
                    order_id,
                    i + 1,
                    FILL_RETRY_DELAYS.len()
                );
            }
        }
    }

    Err(ExecutorError::FillTimeout {
        order_id,
        waited,
        status,
    })
}

/// Whether the resting stop has executed. Stops that were cancelled or
/// rejected by the venue are forgotten so a new one can be placed.
pub(crate) async fn resting_stop_fill(
    venue: &dyn ExecutionVenue,
    position: &mut Position,
) -> Result<Option<OrderInfo>, ExecutorError> {
    let Some(order_id) = position.stop_order_id.clone() else {
        return Ok(None);
    };

    match venue.get_order(&order_id).await {
        Ok(order) if order.is_filled() => Ok(Some(order)),
        Ok(order) if order.is_terminal() => {
            tracing::warn!(
                alert_id = position.alert_id,
                "Protective stop {} is {:?}",
                order_id,
                order.status
            );
            position.stop_order_id = None;
            Ok(None)
        }
        Ok(_) => Ok(None),
        Err(ExecutionError::NotFound(_)) => {
            position.stop_order_id = None;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Cancel an order that should no longer be working. When the venue refuses
/// because the order already executed, the filled order is returned. An
/// order the venue has already closed out counts as withdrawn.
pub(crate) async fn withdraw_order(
    venue: &dyn ExecutionVenue,
    order_id: &str,
) -> Result<Option<OrderInfo>, ExecutorError> {
    match venue.cancel_order(order_id).await {
        Ok(()) | Err(ExecutionError::NotFound(_)) => Ok(None),
        Err(ExecutionError::Rejected(reason)) => {
            let order = venue.get_order(order_id).await?;
            if order.is_filled() {
                Ok(Some(order))
            } else if order.is_terminal() {
                Ok(None)
            } else {
                Err(ExecutionError::Rejected(reason).into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Cancel the resting stop ahead of a market exit. When the venue refuses
/// because the stop already executed, the filled order is returned instead.
pub(crate) async fn cancel_resting_stop(
    venue: &dyn ExecutionVenue,
    position: &mut Position,
) -> Result<Option<OrderInfo>, ExecutorError> {
    let Some(order_id) = position.stop_order_id.clone() else {
        return Ok(None);
    };

    let filled = withdraw_order(venue, &order_id).await?;
    if filled.is_none() {
        position.stop_order_id = None;
    }
    Ok(filled)
}

/// Make sure a sell stop covering the open quantity rests at the position's
/// stop price. Returns true when a new order was placed.
pub(crate) async fn ensure_protective_stop(
    venue: &dyn ExecutionVenue,
    position: &mut Position,
) -> Result<bool, ExecutorError> {
    if !position.is_open() || position.current_quantity == 0 {
        return Ok(false);
    }

    if let Some(order_id) = position.stop_order_id.clone() {
        match venue.get_order(&order_id).await {
            Ok(order) if order.is_filled() => return Ok(false),
            Ok(order)
                if order.status == OrderStatus::Pending
                    && order.quantity == position.current_quantity
                    && order.stop_price == Some(position.stop_price) =>
            {
                return Ok(false)
            }
            Ok(order) if order.status == OrderStatus::Pending => {
                venue.cancel_order(&order_id).await?;
            }
            Ok(_) | Err(ExecutionError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        position.stop_order_id = None;
    }

    let order = venue
        .place_stop_order(OrderSide::Sell, position.current_quantity, position.stop_price)
        .await?;
    tracing::info!(
        alert_id = position.alert_id,
        order_id = %order.order_id,
        quantity = position.current_quantity,
        stop = %position.stop_price,
        "Protective stop placed"
    );
    position.stop_order_id = Some(order.order_id);
    Ok(true)
}
