use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::workflow::Workflow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PurchaseOrder {
    pub id: u64,
    pub po_number: String,
    pub purchase_request_id: u64,
    pub supplier_id: u64,
    pub quotation_id: Option<u64>,
    pub delivery_date: Option<NaiveDate>,
    pub delivery_address: Option<String>,
    pub payment_terms: Option<String>,
    pub total_amount: f64,
    pub status: String,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PurchaseOrderItem {
    pub id: u64,
    pub purchase_order_id: u64,
    pub inventory_item_id: Option<u64>,
    pub description: String,
    pub unit: String,
    pub quantity: i64,
    pub unit_cost: f64,
    pub amount: f64,
    pub quantity_delivered: i64,
}

impl PurchaseOrderItem {
    pub fn remaining(&self) -> i64 {
        (self.quantity - self.quantity_delivered).max(0)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub purchase_order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Approved,
    SentToSupplier,
    PartiallyDelivered,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseOrderAction {
    Approve,
    SendToSupplier,
    Cancel,
    /// Delivery accepted, some lines still open.
    ReceivePartial,
    /// Delivery accepted, every line fully delivered.
    ReceiveAll,
}

impl PurchaseOrderStatus {
    /// Whether deliveries may be recorded against the order.
    pub fn accepts_deliveries(self) -> bool {
        matches!(self, Self::SentToSupplier | Self::PartiallyDelivered)
    }
}

impl Workflow for PurchaseOrderStatus {
    type Action = PurchaseOrderAction;
    const RESOURCE: &'static str = "purchase order";

    fn next(self, action: PurchaseOrderAction) -> Option<Self> {
        use PurchaseOrderAction as A;
        use PurchaseOrderStatus as S;
        match (self, action) {
            (S::Draft, A::Approve) => Some(S::Approved),
            (S::Approved, A::SendToSupplier) => Some(S::SentToSupplier),
            (S::Draft | S::Approved, A::Cancel) => Some(S::Cancelled),
            (S::SentToSupplier | S::PartiallyDelivered, A::ReceivePartial) => {
                Some(S::PartiallyDelivered)
            }
            (S::SentToSupplier | S::PartiallyDelivered, A::ReceiveAll) => Some(S::Completed),
            _ => None,
        }
    }
}

/// Status action after a delivery is accepted, from the post-delivery lines.
pub fn receipt_action(items: &[PurchaseOrderItem]) -> PurchaseOrderAction {
    if items.iter().all(|i| i.remaining() == 0) {
        PurchaseOrderAction::ReceiveAll
    } else {
        PurchaseOrderAction::ReceivePartial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;
    use PurchaseOrderAction as A;
    use PurchaseOrderStatus as S;

    fn line(quantity: i64, delivered: i64) -> PurchaseOrderItem {
        PurchaseOrderItem {
            id: 1,
            purchase_order_id: 1,
            inventory_item_id: None,
            description: "Bond paper".into(),
            unit: "ream".into(),
            quantity,
            unit_cost: 250.0,
            amount: quantity as f64 * 250.0,
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
                (S::Draft, A::Approve, S::Approved),
                (S::Approved, A::SendToSupplier, S::SentToSupplier),
                (S::Draft, A::Cancel, S::Cancelled),
                (S::Approved, A::Cancel, S::Cancelled),
                (S::SentToSupplier, A::ReceivePartial, S::PartiallyDelivered),
                (S::PartiallyDelivered, A::ReceivePartial, S::PartiallyDelivered),
                (S::SentToSupplier, A::ReceiveAll, S::Completed),
                (S::PartiallyDelivered, A::ReceiveAll, S::Completed),
            ],
        );
    }

    #[test]
    fn send_to_supplier_message_is_readable() {
        let err = S::Draft.transition(A::SendToSupplier).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot send to supplier purchase order in draft status."
        );
    }

    #[test]
    fn receipt_completes_only_when_every_line_is_delivered() {
        assert_eq!(receipt_action(&[line(10, 10), line(5, 5)]), A::ReceiveAll);
        assert_eq!(receipt_action(&[line(10, 10), line(5, 4)]), A::ReceivePartial);
    }

    #[test]
    fn remaining_never_negative() {
        assert_eq!(line(5, 7).remaining(), 0);
        assert_eq!(line(5, 2).remaining(), 3);
    }

    #[test]
    fn only_open_orders_accept_deliveries() {
        let open: Vec<S> = S::iter().filter(|s| s.accepts_deliveries()).collect();
        assert_eq!(open, vec![S::SentToSupplier, S::PartiallyDelivered]);
    }
}
