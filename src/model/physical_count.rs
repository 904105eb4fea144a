use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::workflow::Workflow;
use crate::utils::amount::round2;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PhysicalCount {
    pub id: u64,
    pub count_number: String,
    pub count_date: NaiveDate,
    pub status: String,
    pub conducted_by: Option<u64>,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PhysicalCountItem {
    pub id: u64,
    pub physical_count_id: u64,
    pub inventory_item_id: u64,
    pub system_quantity: i64,
    pub counted_quantity: Option<i64>,
    pub unit_cost: f64,
    /// counted − system, filled in after loading.
    #[sqlx(skip)]
    #[serde(default)]
    #[schema(example = -3)]
    pub variance: Option<i64>,
}

impl PhysicalCountItem {
    pub fn with_variance(mut self) -> Self {
        self.variance = self.variance();
        self
    }

    /// counted − system; `None` until the line is counted.
    pub fn variance(&self) -> Option<i64> {
        self.counted_quantity.map(|c| c - self.system_quantity)
    }

    pub fn variance_value(&self) -> f64 {
        round2(self.variance().unwrap_or(0) as f64 * self.unit_cost)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PhysicalCountDetail {
    #[serde(flatten)]
    pub physical_count: PhysicalCount,
    pub items: Vec<PhysicalCountItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VarianceLine {
    pub inventory_item_id: u64,
    pub system_quantity: i64,
    pub counted_quantity: i64,
    pub variance: i64,
    pub unit_cost: f64,
    pub variance_value: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VarianceReport {
    pub physical_count_id: u64,
    pub items: Vec<VarianceLine>,
    pub total_variance_value: f64,
}

/// Lines whose count differs from the snapshot.
pub fn variance_report(physical_count_id: u64, items: &[PhysicalCountItem]) -> VarianceReport {
    let lines: Vec<VarianceLine> = items
        .iter()
        .filter_map(|item| {
            let counted = item.counted_quantity?;
            let variance = counted - item.system_quantity;
            (variance != 0).then(|| VarianceLine {
                inventory_item_id: item.inventory_item_id,
                system_quantity: item.system_quantity,
                counted_quantity: counted,
                variance,
                unit_cost: item.unit_cost,
                variance_value: item.variance_value(),
            })
        })
        .collect();
    let total = round2(lines.iter().map(|l| l.variance_value).sum());
    VarianceReport {
        physical_count_id,
        items: lines,
        total_variance_value: total,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PhysicalCountStatus {
    InProgress,
    Completed,
    Approved,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PhysicalCountAction {
    Complete,
    Approve,
    Cancel,
}

impl Workflow for PhysicalCountStatus {
    type Action = PhysicalCountAction;
    const RESOURCE: &'static str = "physical count";

    fn next(self, action: PhysicalCountAction) -> Option<Self> {
        use PhysicalCountAction as A;
        use PhysicalCountStatus as S;
        match (self, action) {
            (S::InProgress, A::Complete) => Some(S::Completed),
            (S::Completed, A::Approve) => Some(S::Approved),
            (S::InProgress, A::Cancel) => Some(S::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;
    use PhysicalCountAction as A;
    use PhysicalCountStatus as S;

    fn line(item: u64, system: i64, counted: Option<i64>, cost: f64) -> PhysicalCountItem {
        PhysicalCountItem {
            id: item,
            physical_count_id: 1,
            inventory_item_id: item,
            system_quantity: system,
            counted_quantity: counted,
            unit_cost: cost,
            variance: None,
        }
        .with_variance()
    }

    #[test]
    fn items_serialize_their_variance() {
        let short = serde_json::to_value(line(1, 10, Some(7), 2.5)).unwrap();
        assert_eq!(short["variance"], -3);

        let uncounted = serde_json::to_value(line(2, 10, None, 2.5)).unwrap();
        assert!(uncounted["variance"].is_null());
    }

    #[test]
    fn transition_table() {
        let states: Vec<S> = S::iter().collect();
        let actions: Vec<A> = A::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (S::InProgress, A::Complete, S::Completed),
                (S::Completed, A::Approve, S::Approved),
                (S::InProgress, A::Cancel, S::Cancelled),
            ],
        );
    }

    #[test]
    fn report_keeps_only_nonzero_variances() {
        let items = [
            line(1, 10, Some(10), 5.0),
            line(2, 10, Some(7), 12.5),
            line(3, 4, Some(6), 100.0),
            line(4, 3, None, 1.0),
        ];
        let report = variance_report(1, &items);
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.items[0].variance, -3);
        assert_eq!(report.items[0].variance_value, -37.5);
        assert_eq!(report.items[1].variance, 2);
        assert_eq!(report.total_variance_value, 162.5);
    }

    #[test]
    fn uncounted_line_has_no_variance() {
        assert_eq!(line(1, 5, None, 1.0).variance(), None);
        assert_eq!(line(1, 5, Some(0), 1.0).variance(), Some(-5));
    }
}
