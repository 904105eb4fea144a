pub mod budget;
pub mod cash_advance;
pub mod delivery;
pub mod disbursement;
pub mod employee;
pub mod inventory_adjustment;
pub mod inventory_item;
pub mod leave_request;
pub mod liquidation;
pub mod physical_count;
pub mod purchase_order;
pub mod purchase_request;
pub mod quotation;
pub mod role;
pub mod service_record;
pub mod stock_card;
pub mod supplier;
pub mod training;
pub mod user;
pub mod workflow;
