use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

use crate::api::{
    budget::{CreateBudget, UpdateBudget},
    cash_advance::{CreateCashAdvance, UpdateCashAdvance},
    delivery::{CreateDelivery, DeliveryLine, UpdateDelivery},
    disbursement::{CreateDisbursement, UpdateDisbursement},
    employee::{CreateEmployee, PromoteEmployee, UpdateEmployee},
    health::HealthResponse,
    inventory_adjustment::{CreateInventoryAdjustment, UpdateInventoryAdjustment},
    inventory_item::{CreateInventoryItem, UpdateInventoryItem},
    leave_request::{CreateLeaveRequest, UpdateLeaveRequest},
    liquidation::{CreateLiquidation, ExpenseLine, UpdateLiquidation},
    physical_count::{CountLine, CreatePhysicalCount, RecordCounts},
    purchase_order::{CreatePurchaseOrder, UpdatePurchaseOrder},
    purchase_request::{CreatePurchaseRequest, UpdatePurchaseRequest},
    quotation::{CreateQuotation, EvaluateQuotation, UpdateQuotation},
    service_record::{CreateServiceRecord, UpdateServiceRecord},
    stock_card::StockMovementRequest,
    supplier::{CreateSupplier, UpdateSupplier},
    training::{CreateTraining, UpdateTraining},
    user::UpdateUser,
};
use crate::model::{
    budget::{Budget, BudgetCategory, BudgetStatus, BudgetUtilization},
    cash_advance::{CashAdvance, CashAdvanceStatus},
    delivery::{Delivery, DeliveryDetail, DeliveryItem, DeliveryStatus},
    disbursement::{Disbursement, DisbursementStatus, PaymentMode},
    employee::{Employee, EmployeeStatistics, EmployeeStatus, EmploymentStatus},
    inventory_adjustment::{AdjustmentStatus, AdjustmentType, InventoryAdjustment},
    inventory_item::InventoryItem,
    leave_request::{LeaveCredits, LeaveRequest, LeaveStatus, LeaveType},
    liquidation::{Liquidation, LiquidationDetail, LiquidationItem, LiquidationStatus},
    physical_count::{
        PhysicalCount, PhysicalCountDetail, PhysicalCountItem, PhysicalCountStatus, VarianceLine, VarianceReport,
    },
    purchase_order::{PurchaseOrder, PurchaseOrderDetail, PurchaseOrderItem, PurchaseOrderStatus},
    purchase_request::{PurchaseRequest, PurchaseRequestDetail, PurchaseRequestItem, PurchaseRequestStatus},
    quotation::{Quotation, QuotationStatus},
    service_record::ServiceRecord,
    stock_card::{StockBalance, StockCard, TransactionType},
    supplier::{Supplier, SupplierStatistics},
    training::{Training, TrainingStatistics, TrainingStatus, TrainingType},
    role::Role,
    user::UserResponse,
};
use crate::models::{
    AuthResponse, LineItemRequest, LoginRequest, OptionalRemarks, RegisterRequest, RemarksRequest,
    TokenPairResponse,
};
use crate::utils::{
    pagination::{
        BudgetPage, CashAdvancePage, DeliveryPage, DisbursementPage, EmployeePage, InventoryAdjustmentPage,
        InventoryItemPage, LeaveRequestPage, LiquidationPage, PhysicalCountPage, PurchaseOrderPage,
        PurchaseRequestPage, QuotationPage, ServiceRecordPage, StockCardPage, SupplierPage, TrainingPage,
        UserPage,
    },
    response::MessageResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AdminSuite API",
        version = "1.0.0",
        description = r#"
## AdminSuite

Back office API for a public agency covering human resources, procurement,
inventory and finance.

### Modules
- **HR**: employees, leave requests and credits, service records, trainings
- **Procurement**: suppliers, purchase requests, quotations, purchase orders, deliveries
- **Inventory**: items, stock card ledger, adjustments, physical counts
- **Finance**: budgets, cash advances, disbursement vouchers, liquidations
- **Users**: administrators assign roles and link accounts to employee records

### Security
Everything except `/api/health` and the login, register and refresh endpoints
requires `Authorization: Bearer <access_token>`.

### Responses
- Collections are paginated: `{ data, page, per_page, total }`
- Writes return `{ message, data }`
- Validation failures return `422 { message, errors }`
"#,
    ),
    paths(
        crate::api::health::health,

        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::logout,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::me,

        crate::api::employee::list_employees,
        crate::api::employee::search_employees,
        crate::api::employee::employee_statistics,
        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::promote_employee,
        crate::api::employee::leave_credits,

        crate::api::leave_request::list_leave_requests,
        crate::api::leave_request::create_leave_request,
        crate::api::leave_request::get_leave_request,
        crate::api::leave_request::update_leave_request,
        crate::api::leave_request::delete_leave_request,
        crate::api::leave_request::recommend_leave_request,
        crate::api::leave_request::approve_leave_request,
        crate::api::leave_request::disapprove_leave_request,
        crate::api::leave_request::cancel_leave_request,

        crate::api::service_record::list_service_records,
        crate::api::service_record::employee_service_records,
        crate::api::service_record::create_service_record,
        crate::api::service_record::get_service_record,
        crate::api::service_record::update_service_record,
        crate::api::service_record::delete_service_record,

        crate::api::training::list_trainings,
        crate::api::training::training_statistics,
        crate::api::training::trainings_by_type,
        crate::api::training::trainings_by_year,
        crate::api::training::employee_trainings,
        crate::api::training::employee_completed_trainings,
        crate::api::training::create_training,
        crate::api::training::get_training,
        crate::api::training::update_training,
        crate::api::training::delete_training,

        crate::api::supplier::list_suppliers,
        crate::api::supplier::active_suppliers,
        crate::api::supplier::search_suppliers,
        crate::api::supplier::supplier_statistics,
        crate::api::supplier::create_supplier,
        crate::api::supplier::get_supplier,
        crate::api::supplier::update_supplier,
        crate::api::supplier::delete_supplier,

        crate::api::purchase_request::list_purchase_requests,
        crate::api::purchase_request::create_purchase_request,
        crate::api::purchase_request::get_purchase_request,
        crate::api::purchase_request::update_purchase_request,
        crate::api::purchase_request::delete_purchase_request,
        crate::api::purchase_request::submit_purchase_request,
        crate::api::purchase_request::recommend_purchase_request,
        crate::api::purchase_request::approve_purchase_request,
        crate::api::purchase_request::disapprove_purchase_request,
        crate::api::purchase_request::cancel_purchase_request,

        crate::api::quotation::list_quotations,
        crate::api::quotation::create_quotation,
        crate::api::quotation::get_quotation,
        crate::api::quotation::update_quotation,
        crate::api::quotation::delete_quotation,
        crate::api::quotation::evaluate_quotation,
        crate::api::quotation::select_quotation,
        crate::api::quotation::reject_quotation,

        crate::api::purchase_order::list_purchase_orders,
        crate::api::purchase_order::create_purchase_order,
        crate::api::purchase_order::get_purchase_order,
        crate::api::purchase_order::update_purchase_order,
        crate::api::purchase_order::delete_purchase_order,
        crate::api::purchase_order::approve_purchase_order,
        crate::api::purchase_order::send_purchase_order,
        crate::api::purchase_order::cancel_purchase_order,

        crate::api::delivery::list_deliveries,
        crate::api::delivery::create_delivery,
        crate::api::delivery::get_delivery,
        crate::api::delivery::update_delivery,
        crate::api::delivery::delete_delivery,
        crate::api::delivery::inspect_delivery,
        crate::api::delivery::accept_delivery,
        crate::api::delivery::reject_delivery,

        crate::api::inventory_item::list_inventory_items,
        crate::api::inventory_item::low_stock_items,
        crate::api::inventory_item::create_inventory_item,
        crate::api::inventory_item::get_inventory_item,
        crate::api::inventory_item::update_inventory_item,
        crate::api::inventory_item::delete_inventory_item,

        crate::api::stock_card::list_stock_cards,
        crate::api::stock_card::get_stock_card,
        crate::api::stock_card::item_ledger,
        crate::api::stock_card::item_balance,
        crate::api::stock_card::stock_in,
        crate::api::stock_card::stock_out,
        crate::api::stock_card::donation,

        crate::api::inventory_adjustment::list_inventory_adjustments,
        crate::api::inventory_adjustment::create_inventory_adjustment,
        crate::api::inventory_adjustment::get_inventory_adjustment,
        crate::api::inventory_adjustment::update_inventory_adjustment,
        crate::api::inventory_adjustment::delete_inventory_adjustment,
        crate::api::inventory_adjustment::approve_inventory_adjustment,
        crate::api::inventory_adjustment::reject_inventory_adjustment,

        crate::api::physical_count::list_physical_counts,
        crate::api::physical_count::create_physical_count,
        crate::api::physical_count::get_physical_count,
        crate::api::physical_count::delete_physical_count,
        crate::api::physical_count::record_counts,
        crate::api::physical_count::complete_physical_count,
        crate::api::physical_count::cancel_physical_count,
        crate::api::physical_count::physical_count_variances,
        crate::api::physical_count::approve_physical_count,

        crate::api::budget::list_budgets,
        crate::api::budget::create_budget,
        crate::api::budget::get_budget,
        crate::api::budget::update_budget,
        crate::api::budget::delete_budget,
        crate::api::budget::approve_budget,
        crate::api::budget::activate_budget,
        crate::api::budget::close_budget,
        crate::api::budget::budget_utilization,

        crate::api::cash_advance::list_cash_advances,
        crate::api::cash_advance::create_cash_advance,
        crate::api::cash_advance::get_cash_advance,
        crate::api::cash_advance::update_cash_advance,
        crate::api::cash_advance::delete_cash_advance,
        crate::api::cash_advance::approve_cash_advance,
        crate::api::cash_advance::release_cash_advance,
        crate::api::cash_advance::reject_cash_advance,

        crate::api::disbursement::list_disbursements,
        crate::api::disbursement::create_disbursement,
        crate::api::disbursement::get_disbursement,
        crate::api::disbursement::update_disbursement,
        crate::api::disbursement::delete_disbursement,
        crate::api::disbursement::certify_disbursement,
        crate::api::disbursement::approve_disbursement,
        crate::api::disbursement::mark_disbursement_paid,
        crate::api::disbursement::reject_disbursement,

        crate::api::liquidation::list_liquidations,
        crate::api::liquidation::create_liquidation,
        crate::api::liquidation::get_liquidation,
        crate::api::liquidation::update_liquidation,
        crate::api::liquidation::delete_liquidation,
        crate::api::liquidation::approve_liquidation,
        crate::api::liquidation::reject_liquidation,

        crate::api::user::list_users,
        crate::api::user::get_user,
        crate::api::user::update_user
    ),
    components(
        schemas(
            MessageResponse,
            HealthResponse,
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            TokenPairResponse,
            UserResponse,
            RemarksRequest,
            OptionalRemarks,
            LineItemRequest,

            Employee,
            EmployeePage,
            EmployeeStatistics,
            EmploymentStatus,
            EmployeeStatus,
            CreateEmployee,
            UpdateEmployee,
            PromoteEmployee,
            LeaveCredits,
            LeaveRequest,
            LeaveRequestPage,
            LeaveType,
            LeaveStatus,
            CreateLeaveRequest,
            UpdateLeaveRequest,
            ServiceRecord,
            ServiceRecordPage,
            CreateServiceRecord,
            UpdateServiceRecord,
            Training,
            TrainingPage,
            TrainingType,
            TrainingStatus,
            TrainingStatistics,
            CreateTraining,
            UpdateTraining,

            Supplier,
            SupplierPage,
            SupplierStatistics,
            CreateSupplier,
            UpdateSupplier,
            PurchaseRequest,
            PurchaseRequestPage,
            PurchaseRequestItem,
            PurchaseRequestDetail,
            PurchaseRequestStatus,
            CreatePurchaseRequest,
            UpdatePurchaseRequest,
            Quotation,
            QuotationPage,
            QuotationStatus,
            CreateQuotation,
            UpdateQuotation,
            EvaluateQuotation,
            PurchaseOrder,
            PurchaseOrderPage,
            PurchaseOrderItem,
            PurchaseOrderDetail,
            PurchaseOrderStatus,
            CreatePurchaseOrder,
            UpdatePurchaseOrder,
            Delivery,
            DeliveryPage,
            DeliveryItem,
            DeliveryDetail,
            DeliveryStatus,
            DeliveryLine,
            CreateDelivery,
            UpdateDelivery,

            InventoryItem,
            InventoryItemPage,
            CreateInventoryItem,
            UpdateInventoryItem,
            StockCard,
            StockCardPage,
            StockBalance,
            TransactionType,
            StockMovementRequest,
            InventoryAdjustment,
            InventoryAdjustmentPage,
            AdjustmentType,
            AdjustmentStatus,
            CreateInventoryAdjustment,
            UpdateInventoryAdjustment,
            PhysicalCount,
            PhysicalCountPage,
            PhysicalCountItem,
            PhysicalCountDetail,
            PhysicalCountStatus,
            VarianceLine,
            VarianceReport,
            CreatePhysicalCount,
            CountLine,
            RecordCounts,

            Budget,
            BudgetPage,
            BudgetCategory,
            BudgetStatus,
            BudgetUtilization,
            CreateBudget,
            UpdateBudget,
            CashAdvance,
            CashAdvancePage,
            CashAdvanceStatus,
            CreateCashAdvance,
            UpdateCashAdvance,
            Disbursement,
            DisbursementPage,
            DisbursementStatus,
            PaymentMode,
            CreateDisbursement,
            UpdateDisbursement,
            Liquidation,
            LiquidationPage,
            LiquidationItem,
            LiquidationDetail,
            LiquidationStatus,
            ExpenseLine,
            CreateLiquidation,
            UpdateLiquidation,

            Role,
            UserPage,
            UpdateUser
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Employees", description = "Employee records, promotion and statistics"),
        (name = "Leave Requests", description = "Leave filing, approval and credit deduction"),
        (name = "Service Records", description = "Employment history"),
        (name = "Trainings", description = "Training attendance"),
        (name = "Suppliers", description = "Supplier directory"),
        (name = "Purchase Requests", description = "Purchase request workflow"),
        (name = "Quotations", description = "Supplier quotations and canvass selection"),
        (name = "Purchase Orders", description = "Purchase order workflow"),
        (name = "Deliveries", description = "Delivery inspection and acceptance"),
        (name = "Inventory Items", description = "Stock catalogue"),
        (name = "Stock Cards", description = "Stock ledger and movements"),
        (name = "Inventory Adjustments", description = "Approved corrections to stock"),
        (name = "Physical Counts", description = "Periodic counts and variance posting"),
        (name = "Budgets", description = "Budget allocation and utilization"),
        (name = "Cash Advances", description = "Cash advance workflow"),
        (name = "Disbursements", description = "Disbursement vouchers"),
        (name = "Liquidations", description = "Cash advance liquidation"),
        (name = "Users", description = "Account roles and employee links (administrators)"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn document_lists_workflow_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/deliveries/{id}/accept",
            "/api/physical-counts/{id}/variances",
            "/api/disbursements/{id}/mark-paid",
            "/api/stock-cards/item/{item_id}/balance",
            "/api/users/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
