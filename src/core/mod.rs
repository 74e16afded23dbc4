//! Core domain types for the quarterly construction ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod amount;
pub mod carryover;
pub mod engine;
pub mod merge;

/// Category of a project, as recorded by the project register.
///
/// The set is open ended; only the factory category changes settlement
/// behaviour (its secondary payable is folded into the carried-forward
/// debt). Values round-trip through the original Vietnamese labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProjectType {
    /// "Thi công" — a construction site.
    Construction,
    /// "Nhà máy" — a factory.
    Factory,
    /// "Đầu tư" — an investment project.
    Investment,
    /// Any other label found in the register.
    Other(String),
}

impl ProjectType {
    /// Returns true for factory projects, which carry a secondary payable.
    pub fn is_factory(&self) -> bool {
        matches!(self, ProjectType::Factory)
    }
}

impl Default for ProjectType {
    fn default() -> Self {
        ProjectType::Construction
    }
}

impl From<String> for ProjectType {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Thi công" => ProjectType::Construction,
            "Nhà máy" => ProjectType::Factory,
            "Đầu tư" => ProjectType::Investment,
            _ => ProjectType::Other(label),
        }
    }
}

impl From<ProjectType> for String {
    fn from(kind: ProjectType) -> Self {
        match kind {
            ProjectType::Construction => "Thi công".to_string(),
            ProjectType::Factory => "Nhà máy".to_string(),
            ProjectType::Investment => "Đầu tư".to_string(),
            ProjectType::Other(label) => label,
        }
    }
}

/// A project as read from the project register. Read-only input here;
/// creation and editing happen elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ProjectType,
    #[serde(
        rename = "totalAmount",
        default,
        deserialize_with = "amount::de_amount"
    )]
    pub total_amount: i64,
}

/// A calendar quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    /// The quarter after this one, wrapping Q4 back to Q1.
    pub fn next(self) -> Quarter {
        match self {
            Quarter::Q1 => Quarter::Q2,
            Quarter::Q2 => Quarter::Q3,
            Quarter::Q3 => Quarter::Q4,
            Quarter::Q4 => Quarter::Q1,
        }
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for Quarter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "Q1" => Ok(Quarter::Q1),
            "Q2" => Ok(Quarter::Q2),
            "Q3" => Ok(Quarter::Q3),
            "Q4" => Ok(Quarter::Q4),
            other => Err(format!("unknown quarter: {other}")),
        }
    }
}

/// The (year, quarter) pair following the given one: Q4 rolls over into Q1
/// of the next year, every other quarter stays within the year.
pub fn next_period(year: i32, quarter: Quarter) -> (i32, Quarter) {
    match quarter {
        Quarter::Q4 => (year + 1, Quarter::Q1),
        q => (year, q.next()),
    }
}

/// Composite identity of a line item within a period. Unique per period;
/// the merge resolver reconciles quarters by this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub project: String,
    pub description: String,
}

/// One cost/revenue row of a quarter period.
///
/// Serialized field names follow the stored documents, which mix English
/// and Vietnamese ledger terms. Numeric fields are whole VND; legacy
/// documents may carry them as formatted strings, which the deserializers
/// coerce through [`amount`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineItem {
    pub id: String,
    /// Project code of the row, e.g. "XD-01" or "XD-01-CP".
    pub project: String,
    pub description: String,
    /// Opening inventory advance.
    #[serde(deserialize_with = "amount::de_amount")]
    pub inventory: i64,
    /// Opening payable.
    #[serde(deserialize_with = "amount::de_amount")]
    pub debt: i64,
    #[serde(rename = "directCost", deserialize_with = "amount::de_amount")]
    pub direct_cost: i64,
    #[serde(deserialize_with = "amount::de_amount")]
    pub allocated: i64,
    #[serde(
        rename = "payableDeductionThisQuarter",
        deserialize_with = "amount::de_amount"
    )]
    pub payable_deduction_this_quarter: i64,
    /// Opening carry value.
    #[serde(deserialize_with = "amount::de_amount")]
    pub carryover: i64,
    #[serde(rename = "carryoverMinus", deserialize_with = "amount::de_amount")]
    pub carryover_minus: i64,
    /// Closing carry value.
    #[serde(rename = "carryoverEnd", deserialize_with = "amount::de_amount")]
    pub carryover_end: i64,
    /// Closing inventory ("tồn kho ứng kế hoạch").
    #[serde(rename = "tonKhoUngKH", deserialize_with = "amount::de_amount")]
    pub ton_kho_ung_kh: i64,
    /// Closing payable ("nợ phải trả cuối kỳ").
    #[serde(rename = "noPhaiTraCK", deserialize_with = "amount::de_amount")]
    pub no_phai_tra_ck: i64,
    /// Factory-only secondary payable ("nợ phải trả nhà máy").
    #[serde(rename = "noPhaiTraNM", deserialize_with = "amount::de_amount")]
    pub no_phai_tra_nm: i64,
    #[serde(rename = "totalCost", deserialize_with = "amount::de_amount")]
    pub total_cost: i64,
    #[serde(rename = "cpVuot", deserialize_with = "amount::de_amount")]
    pub cp_vuot: i64,
    #[serde(deserialize_with = "amount::de_amount")]
    pub revenue: i64,
    /// Allocation coefficient, copied verbatim between quarters. Kept as a
    /// string: it may be fractional and the engine never computes with it.
    pub hskh: String,
    #[serde(rename = "cpSauQuyetToan", deserialize_with = "amount::de_amount")]
    pub cp_sau_quyet_toan: i64,
    /// Snapshot of last quarter's `debt − directCost`, seeded by settlement
    /// onto the following quarter's row. Absent until the first close.
    #[serde(rename = "baseForNptck", deserialize_with = "amount::de_opt_amount")]
    pub base_for_nptck: Option<i64>,
    /// Item-level echo of the period finalize flag.
    #[serde(rename = "isFinalized", deserialize_with = "amount::de_flag")]
    pub is_finalized: bool,
}

impl LineItem {
    /// A blank row template with a fresh unique id, used when the merge
    /// resolver synthesizes a next-quarter row.
    pub fn blank() -> Self {
        LineItem {
            id: Uuid::new_v4().to_string(),
            hskh: "0".to_string(),
            ..LineItem::default()
        }
    }

    /// The composite merge key of this row.
    pub fn key(&self) -> ItemKey {
        ItemKey {
            project: self.project.clone(),
            description: self.description.clone(),
        }
    }

    /// CP rows are overhead/indirect-cost rows, marked by a "-CP" fragment
    /// in the project code; everything else is a material/labor (VT/NC)
    /// row. The two classes close with different formulas.
    pub fn is_overhead(&self) -> bool {
        self.project.contains("-CP")
    }
}

/// A per-project quarter snapshot as stored by the period store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Period {
    pub items: Vec<LineItem>,
    #[serde(rename = "overallRevenue", deserialize_with = "amount::de_amount")]
    pub overall_revenue: i64,
    #[serde(rename = "isFinalized", deserialize_with = "amount::de_flag")]
    pub is_finalized: bool,
    #[serde(rename = "finalizedAt", skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    #[serde(rename = "updated_at", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Period {
    /// True when the period must not be settled again: either the period
    /// flag is set, or any row carries the item-level echo. The item scan
    /// guards partially migrated documents whose period flag was lost.
    pub fn is_closed(&self) -> bool {
        self.is_finalized || self.items.iter().any(|i| i.is_finalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_rollover() {
        assert_eq!(next_period(2024, Quarter::Q1), (2024, Quarter::Q2));
        assert_eq!(next_period(2024, Quarter::Q2), (2024, Quarter::Q3));
        assert_eq!(next_period(2024, Quarter::Q3), (2024, Quarter::Q4));
        assert_eq!(next_period(2024, Quarter::Q4), (2025, Quarter::Q1));
    }

    #[test]
    fn quarter_parses_case_insensitively() {
        assert_eq!("q3".parse::<Quarter>(), Ok(Quarter::Q3));
        assert!("Q5".parse::<Quarter>().is_err());
    }

    #[test]
    fn project_type_round_trips_labels() {
        let factory: ProjectType = "Nhà máy".to_string().into();
        assert!(factory.is_factory());
        assert_eq!(String::from(factory), "Nhà máy");

        let odd: ProjectType = "Khác".to_string().into();
        assert_eq!(odd, ProjectType::Other("Khác".to_string()));
    }

    #[test]
    fn overhead_classification_uses_cp_marker() {
        let mut item = LineItem::blank();
        item.project = "XD-01".to_string();
        assert!(!item.is_overhead());
        item.project = "XD-01-CP".to_string();
        assert!(item.is_overhead());
    }

    #[test]
    fn item_deserializes_legacy_string_fields() {
        let item: LineItem = serde_json::from_str(
            r#"{
                "id": "r1",
                "project": "XD-01",
                "description": "Thép",
                "debt": "1.200.000",
                "directCost": 250000,
                "tonKhoUngKH": "500",
                "isFinalized": "true"
            }"#,
        )
        .unwrap();
        assert_eq!(item.debt, 1_200_000);
        assert_eq!(item.direct_cost, 250_000);
        assert_eq!(item.ton_kho_ung_kh, 500);
        assert!(item.is_finalized);
        assert_eq!(item.base_for_nptck, None);
    }

    #[test]
    fn period_closed_check_scans_items() {
        let mut period = Period::default();
        assert!(!period.is_closed());

        let mut item = LineItem::blank();
        item.is_finalized = true;
        period.items.push(item);
        assert!(period.is_closed());
    }
}
