pub mod amount;
pub mod db_utils;
pub mod doc_number;
pub mod email_cache;
pub mod email_filter;
pub mod pagination;
pub mod response;
pub mod token_denylist;
