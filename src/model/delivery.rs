use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult, FieldErrors};
use crate::model::purchase_order::PurchaseOrderItem;
use crate::model::workflow::Workflow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Delivery {
    pub id: u64,
    pub purchase_order_id: u64,
    pub delivery_receipt_number: String,
    pub delivery_date: NaiveDate,
    pub status: String,
    pub inspected_by: Option<u64>,
    pub inspected_at: Option<DateTime<Utc>>,
    pub inspection_remarks: Option<String>,
    pub received_by: Option<u64>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DeliveryItem {
    pub id: u64,
    pub delivery_id: u64,
    pub purchase_order_item_id: u64,
    pub quantity_delivered: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryDetail {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub items: Vec<DeliveryItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Inspected,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryAction {
    Inspect,
    Accept,
    Reject,
}

impl Workflow for DeliveryStatus {
    type Action = DeliveryAction;
    const RESOURCE: &'static str = "delivery";

    fn next(self, action: DeliveryAction) -> Option<Self> {
        use DeliveryAction as A;
        use DeliveryStatus as S;
        match (self, action) {
            (S::Pending, A::Inspect) => Some(S::Inspected),
            (S::Inspected, A::Accept) => Some(S::Accepted),
            (S::Pending | S::Inspected, A::Reject) => Some(S::Rejected),
            _ => None,
        }
    }
}

/// Checks delivered quantities against what is still open on the order.
/// `lines` are `(purchase_order_item_id, quantity_delivered)` pairs in request order.
pub fn check_quantities(lines: &[(u64, i64)], order_items: &[PurchaseOrderItem]) -> ApiResult<()> {
    let open: HashMap<u64, i64> = order_items.iter().map(|i| (i.id, i.remaining())).collect();
    let mut claimed: HashMap<u64, i64> = HashMap::new();
    let mut errors = FieldErrors::new();

    for (index, (item_id, quantity)) in lines.iter().enumerate() {
        let Some(remaining) = open.get(item_id) else {
            errors.insert(
                format!("items.{}.purchase_order_item_id", index),
                vec!["The selected purchase order item is invalid.".to_string()],
            );
            continue;
        };
        let total = claimed.entry(*item_id).or_insert(0);
        *total += quantity;
        if *total > *remaining {
            errors.insert(
                format!("items.{}.quantity_delivered", index),
                vec![format!(
                    "The quantity delivered exceeds the undelivered quantity of {}.",
                    remaining
                )],
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;
    use DeliveryAction as A;
    use DeliveryStatus as S;

    fn po_line(id: u64, quantity: i64, delivered: i64) -> PurchaseOrderItem {
        PurchaseOrderItem {
            id,
            purchase_order_id: 9,
            inventory_item_id: Some(100 + id),
            description: "Toner".into(),
            unit: "pc".into(),
            quantity,
            unit_cost: 1800.0,
            amount: quantity as f64 * 1800.0,
            quantity_delivered: delivered,
        }
    }

    #[test]
    fn transition_table() {
        let states: Vec<S> = S::iter().collect();
        let actions: Vec<A> = A::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (S::Pending, A::Inspect, S::Inspected),
                (S::Inspected, A::Accept, S::Accepted),
                (S::Pending, A::Reject, S::Rejected),
                (S::Inspected, A::Reject, S::Rejected),
            ],
        );
    }

    #[test]
    fn delivery_within_open_quantity_passes() {
        let items = [po_line(1, 10, 4), po_line(2, 3, 0)];
        assert!(check_quantities(&[(1, 6), (2, 1)], &items).is_ok());
    }

    #[test]
    fn over_delivery_is_flagged_per_line() {
        let items = [po_line(1, 10, 4)];
        let err = check_quantities(&[(1, 7)], &items).unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("items.0.quantity_delivered"));
    }

    #[test]
    fn repeated_lines_are_summed() {
        let items = [po_line(1, 5, 0)];
        let err = check_quantities(&[(1, 3), (1, 3)], &items).unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("items.1.quantity_delivered"));
        assert!(!errors.contains_key("items.0.quantity_delivered"));
    }

    #[test]
    fn foreign_order_line_is_rejected() {
        let items = [po_line(1, 5, 0)];
        assert!(check_quantities(&[(99, 1)], &items).is_err());
    }
}
