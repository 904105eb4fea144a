use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{
    budget::Budget, cash_advance::CashAdvance, delivery::Delivery, disbursement::Disbursement,
    employee::Employee, inventory_adjustment::InventoryAdjustment, inventory_item::InventoryItem,
    leave_request::LeaveRequest, liquidation::Liquidation, physical_count::PhysicalCount,
    purchase_order::PurchaseOrder, purchase_request::PurchaseRequest, quotation::Quotation,
    service_record::ServiceRecord, stock_card::StockCard, supplier::Supplier, training::Training,
    user::UserResponse,
};

pub const DEFAULT_PER_PAGE: u64 = 15;
pub const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    /// 1-based page; per_page clamped to 1..=100.
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    EmployeePage = Paginated<Employee>,
    LeaveRequestPage = Paginated<LeaveRequest>,
    ServiceRecordPage = Paginated<ServiceRecord>,
    TrainingPage = Paginated<Training>,
    SupplierPage = Paginated<Supplier>,
    PurchaseRequestPage = Paginated<PurchaseRequest>,
    QuotationPage = Paginated<Quotation>,
    PurchaseOrderPage = Paginated<PurchaseOrder>,
    DeliveryPage = Paginated<Delivery>,
    InventoryItemPage = Paginated<InventoryItem>,
    StockCardPage = Paginated<StockCard>,
    InventoryAdjustmentPage = Paginated<InventoryAdjustment>,
    PhysicalCountPage = Paginated<PhysicalCount>,
    BudgetPage = Paginated<Budget>,
    CashAdvancePage = Paginated<CashAdvance>,
    DisbursementPage = Paginated<Disbursement>,
    LiquidationPage = Paginated<Liquidation>,
    UserPage = Paginated<UserResponse>
)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 15)]
    pub per_page: u64,
    #[schema(example = 42)]
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page() {
        let p = Pagination::new(None, None);
        assert_eq!(p, Pagination { page: 1, per_page: DEFAULT_PER_PAGE });
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let p = Pagination::new(Some(0), Some(5000));
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, MAX_PER_PAGE);

        let p = Pagination::new(Some(3), Some(0));
        assert_eq!(p.per_page, 1);
        assert_eq!(p.offset(), 2);
    }

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(Pagination::new(Some(4), Some(10)).offset(), 30);
    }
}
