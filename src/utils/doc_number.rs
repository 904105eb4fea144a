use chrono::{Datelike, NaiveDate};
use sqlx::MySqlConnection;
use strum_macros::AsRefStr;

/// Series that receive a generated `PREFIX-YYYY-NNNN` number.
#[derive(Debug, Clone, Copy, AsRefStr)]
pub enum DocumentSeries {
    #[strum(serialize = "PR")]
    PurchaseRequest,
    #[strum(serialize = "PO")]
    PurchaseOrder,
    #[strum(serialize = "CA")]
    CashAdvance,
    #[strum(serialize = "DV")]
    Disbursement,
    #[strum(serialize = "LQ")]
    Liquidation,
    #[strum(serialize = "PC")]
    PhysicalCount,
}

pub fn format_number(series: DocumentSeries, year: i32, sequence: u64) -> String {
    format!("{}-{}-{:04}", series.as_ref(), year, sequence)
}

/// Increments the per-year counter atomically. Must run inside the transaction
/// that inserts the document so a rollback does not burn a number twice.
pub async fn next_number(
    conn: &mut MySqlConnection,
    series: DocumentSeries,
    date: NaiveDate,
) -> Result<String, sqlx::Error> {
    let year = date.year();

    sqlx::query(
        r#"
        INSERT INTO document_sequences (prefix, year, last_value)
        VALUES (?, ?, LAST_INSERT_ID(1))
        ON DUPLICATE KEY UPDATE last_value = LAST_INSERT_ID(last_value + 1)
        "#,
    )
    .bind(series.as_ref())
    .bind(year)
    .execute(&mut *conn)
    .await?;

    let sequence: u64 = sqlx::query_scalar("SELECT LAST_INSERT_ID()")
        .fetch_one(&mut *conn)
        .await?;

    Ok(format_number(series, year, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_four_digits() {
        assert_eq!(format_number(DocumentSeries::PurchaseRequest, 2026, 1), "PR-2026-0001");
        assert_eq!(format_number(DocumentSeries::Disbursement, 2026, 42), "DV-2026-0042");
    }

    #[test]
    fn widens_past_four_digits() {
        assert_eq!(format_number(DocumentSeries::PurchaseOrder, 2027, 12345), "PO-2027-12345");
    }

    #[test]
    fn every_series_has_a_distinct_prefix() {
        let prefixes = [
            DocumentSeries::PurchaseRequest,
            DocumentSeries::PurchaseOrder,
            DocumentSeries::CashAdvance,
            DocumentSeries::Disbursement,
            DocumentSeries::Liquidation,
            DocumentSeries::PhysicalCount,
        ]
        .map(|s| s.as_ref().to_string());
        let mut unique = prefixes.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), prefixes.len());
    }
}
