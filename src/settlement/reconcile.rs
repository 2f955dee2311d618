//! Order / refund reconciliation into one net spend figure.

use serde_json::Value;

use crate::models::SpendResult;

const ORDER_TOTAL_FIELD: &str = "sumDealPrice";
const ORDER_ITEMS_FIELD: &str = "orderItems";
const REFUND_TOTAL_FIELD: &str = "returnMoney";
const REFUND_ITEMS_FIELD: &str = "returnOrderItems";

/// Net spend for one order identifier.
///
/// `None` when there are no order records at all. Missing or empty refund records count as 0.
pub fn reconcile(
    order_results: Option<&[Value]>,
    refund_results: Option<&[Value]>,
) -> Option<SpendResult> {
    let orders = order_results.filter(|r| !r.is_empty())?;

    let order_total: f64 = orders.iter().map(order_amount).map(finite_or_zero).sum();
    let refund_total: f64 = refund_results
        .unwrap_or_default()
        .iter()
        .map(refund_amount)
        .map(finite_or_zero)
        .sum();

    Some(SpendResult::new(order_total, refund_total))
}

/// Order-level total, falling back to the sum of its line items.
fn order_amount(order: &Value) -> f64 {
    match present(order, ORDER_TOTAL_FIELD) {
        Some(total) => to_amount(total),
        None => items(order, ORDER_ITEMS_FIELD)
            .map(|item| item.get(ORDER_TOTAL_FIELD).map(to_amount).unwrap_or(0.0))
            .sum(),
    }
}

/// Refunds are summed as absolute values; upstream reports them with either sign.
fn refund_amount(refund: &Value) -> f64 {
    match present(refund, REFUND_TOTAL_FIELD) {
        Some(total) => to_amount(total).abs(),
        None => items(refund, REFUND_ITEMS_FIELD)
            .map(|item| {
                item.get(REFUND_TOTAL_FIELD)
                    .map(to_amount)
                    .unwrap_or(0.0)
                    .abs()
            })
            .sum(),
    }
}

fn present<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|v| !v.is_null())
}

fn items<'a>(record: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    record
        .get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Lenient numeric coercion: numbers and numeric strings count, anything else is 0.
fn to_amount(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(0.0)
            }
        }
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };
    finite_or_zero(n)
}

fn finite_or_zero(n: f64) -> f64 {
    if n.is_finite() {
        n
    } else {
        0.0
    }
}
