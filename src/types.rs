use crate::util::days_diff;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tabled::Tabled;

/// The fixed set of procurement attributes the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    PoId,
    Supplier,
    PoDate,
    PromisedDeliveryDate,
    ActualDeliveryDate,
    DeliveryStatus,
    DefectFlag,
    DefectCount,
    ComplianceFlag,
    ComplianceIssueType,
    PartialOrderFlag,
    QtyOrdered,
    QtyReceived,
    UnitPrice,
    TotalCost,
    SavingsAmount,
    Category,
    Region,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 18] = [
        CanonicalField::PoId,
        CanonicalField::Supplier,
        CanonicalField::PoDate,
        CanonicalField::PromisedDeliveryDate,
        CanonicalField::ActualDeliveryDate,
        CanonicalField::DeliveryStatus,
        CanonicalField::DefectFlag,
        CanonicalField::DefectCount,
        CanonicalField::ComplianceFlag,
        CanonicalField::ComplianceIssueType,
        CanonicalField::PartialOrderFlag,
        CanonicalField::QtyOrdered,
        CanonicalField::QtyReceived,
        CanonicalField::UnitPrice,
        CanonicalField::TotalCost,
        CanonicalField::SavingsAmount,
        CanonicalField::Category,
        CanonicalField::Region,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CanonicalField::PoId => "po_id",
            CanonicalField::Supplier => "supplier",
            CanonicalField::PoDate => "po_date",
            CanonicalField::PromisedDeliveryDate => "promised_delivery_date",
            CanonicalField::ActualDeliveryDate => "actual_delivery_date",
            CanonicalField::DeliveryStatus => "delivery_status",
            CanonicalField::DefectFlag => "defect_flag",
            CanonicalField::DefectCount => "defect_count",
            CanonicalField::ComplianceFlag => "compliance_flag",
            CanonicalField::ComplianceIssueType => "compliance_issue_type",
            CanonicalField::PartialOrderFlag => "partial_order_flag",
            CanonicalField::QtyOrdered => "qty_ordered",
            CanonicalField::QtyReceived => "qty_received",
            CanonicalField::UnitPrice => "unit_price",
            CanonicalField::TotalCost => "total_cost",
            CanonicalField::SavingsAmount => "savings_amount",
            CanonicalField::Category => "category",
            CanonicalField::Region => "region",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CanonicalField::PoId => "PO ID",
            CanonicalField::Supplier => "Supplier",
            CanonicalField::PoDate => "PO Date",
            CanonicalField::PromisedDeliveryDate => "Promised Delivery Date",
            CanonicalField::ActualDeliveryDate => "Actual Delivery Date",
            CanonicalField::DeliveryStatus => "Delivery Status",
            CanonicalField::DefectFlag => "Defect Flag",
            CanonicalField::DefectCount => "Defect Count",
            CanonicalField::ComplianceFlag => "Compliance Flag",
            CanonicalField::ComplianceIssueType => "Compliance Issue Type",
            CanonicalField::PartialOrderFlag => "Partial Order Flag",
            CanonicalField::QtyOrdered => "Qty Ordered",
            CanonicalField::QtyReceived => "Qty Received",
            CanonicalField::UnitPrice => "Unit Price",
            CanonicalField::TotalCost => "Total Cost",
            CanonicalField::SavingsAmount => "Savings",
            CanonicalField::Category => "Category",
            CanonicalField::Region => "Region",
        }
    }

    /// Rows cannot be mapped until these fields point at a source column.
    pub fn is_required(self) -> bool {
        matches!(self, CanonicalField::PoId | CanonicalField::Supplier)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Canonical field -> source header. Always holds an entry for every field;
/// `None` means unmapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<CanonicalField, Option<String>>",
    into = "BTreeMap<CanonicalField, Option<String>>"
)]
pub struct ColumnMapping {
    fields: BTreeMap<CanonicalField, Option<String>>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            fields: CanonicalField::ALL.iter().map(|f| (*f, None)).collect(),
        }
    }
}

impl From<BTreeMap<CanonicalField, Option<String>>> for ColumnMapping {
    // Stored mappings are merged over the default so missing keys stay unmapped.
    fn from(stored: BTreeMap<CanonicalField, Option<String>>) -> Self {
        let mut mapping = ColumnMapping::default();
        for (field, header) in stored {
            mapping.set(field, header);
        }
        mapping
    }
}

impl From<ColumnMapping> for BTreeMap<CanonicalField, Option<String>> {
    fn from(mapping: ColumnMapping) -> Self {
        mapping.fields
    }
}

impl ColumnMapping {
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.fields.get(&field).and_then(|h| h.as_deref())
    }

    pub fn set(&mut self, field: CanonicalField, header: Option<String>) {
        self.fields.insert(field, header.filter(|h| !h.is_empty()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, Option<&str>)> + '_ {
        self.fields.iter().map(|(f, h)| (*f, h.as_deref()))
    }

    pub fn mapped_count(&self) -> usize {
        self.fields.values().filter(|h| h.is_some()).count()
    }

    /// Unmaps every field whose header is not in `headers`.
    pub fn retain_headers(&mut self, headers: &[String]) {
        for header in self.fields.values_mut() {
            if header.as_ref().is_some_and(|h| !headers.contains(h)) {
                *header = None;
            }
        }
    }
}

/// One normalized procurement line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub po_id: String,
    pub supplier: String,
    pub po_date: Option<NaiveDate>,
    pub promised_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<NaiveDate>,
    pub delivery_status: Option<String>,
    pub defect_flag: Option<bool>,
    pub defect_count: Option<f64>,
    pub compliance_flag: Option<bool>,
    pub compliance_issue_type: Option<String>,
    pub partial_order_flag: Option<bool>,
    pub qty_ordered: Option<f64>,
    pub qty_received: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_cost: Option<f64>,
    pub savings_amount: Option<f64>,
    pub category: Option<String>,
    pub region: Option<String>,
    #[serde(skip)]
    pub source_row: IndexMap<String, String>,
}

impl CanonicalRecord {
    /// An otherwise empty record; used as the starting point for canonicalization.
    pub fn new(po_id: impl Into<String>, supplier: impl Into<String>) -> Self {
        Self {
            po_id: po_id.into(),
            supplier: supplier.into(),
            po_date: None,
            promised_delivery_date: None,
            actual_delivery_date: None,
            delivery_status: None,
            defect_flag: None,
            defect_count: None,
            compliance_flag: None,
            compliance_issue_type: None,
            partial_order_flag: None,
            qty_ordered: None,
            qty_received: None,
            unit_price: None,
            total_cost: None,
            savings_amount: None,
            category: None,
            region: None,
            source_row: IndexMap::new(),
        }
    }

    /// First available of po / promised / actual date.
    pub fn reference_date(&self) -> Option<NaiveDate> {
        self.po_date
            .or(self.promised_delivery_date)
            .or(self.actual_delivery_date)
    }

    pub fn has_delivery_dates(&self) -> bool {
        self.promised_delivery_date.is_some() && self.actual_delivery_date.is_some()
    }

    pub fn is_defective(&self) -> bool {
        self.defect_flag == Some(true) || self.defect_count.is_some_and(|c| c > 0.0)
    }

    pub fn has_compliance_gap(&self) -> bool {
        self.compliance_flag == Some(true)
            || self
                .compliance_issue_type
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }

    pub fn is_partial(&self) -> bool {
        if self.partial_order_flag == Some(true) {
            return true;
        }
        match (self.qty_received, self.qty_ordered) {
            (Some(received), Some(ordered)) => received < ordered,
            _ => false,
        }
    }

    /// Actual minus promised, in days; negative when delivered early.
    pub fn days_late(&self) -> Option<f64> {
        match (self.promised_delivery_date, self.actual_delivery_date) {
            (Some(promised), Some(actual)) => Some(days_diff(promised, actual)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 67.0 {
            RiskBand::High
        } else if score >= 34.0 {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskBand::Low => "Low",
            RiskBand::Medium => "Medium",
            RiskBand::High => "High",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierMetric {
    pub supplier: String,
    pub total_pos: usize,
    pub on_time_rate: f64,
    pub late_rate: f64,
    pub avg_days_late: f64,
    pub missing_delivery_rate: f64,
    pub defect_rate: f64,
    pub compliance_gap_rate: f64,
    pub partial_order_rate: f64,
    pub price_outlier_rate: f64,
    pub risk_score: f64,
    pub risk_band: RiskBand,
    pub late_deliveries: usize,
    pub defects: usize,
    pub compliance_gaps: usize,
    pub partial_orders: usize,
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct MonthlyRiskPoint {
    #[tabled(rename = "Month")]
    pub month: String,
    #[tabled(rename = "RiskScore")]
    pub risk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySupplierRates {
    pub month: String,
    pub late_rate: f64,
    pub defect_rate: f64,
    pub compliance_gap_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueType {
    Late,
    Defect,
    Compliance,
    #[serde(rename = "Missing Dates")]
    MissingDates,
    Partial,
    #[serde(rename = "Price Outlier")]
    PriceOutlier,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueType::Late => "Late",
            IssueType::Defect => "Defect",
            IssueType::Compliance => "Compliance",
            IssueType::MissingDates => "Missing Dates",
            IssueType::Partial => "Partial",
            IssueType::PriceOutlier => "Price Outlier",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct SupplierIssue {
    #[serde(rename = "PoId")]
    #[tabled(rename = "PoId")]
    pub po_id: String,
    #[serde(rename = "Supplier")]
    #[tabled(rename = "Supplier")]
    pub supplier: String,
    #[serde(rename = "IssueType")]
    #[tabled(rename = "IssueType")]
    pub issue_type: IssueType,
    #[serde(rename = "DaysLate")]
    #[tabled(rename = "DaysLate", display_with = "display_opt_f64")]
    pub days_late: Option<f64>,
    #[serde(rename = "Details")]
    #[tabled(rename = "Details", display_with = "display_opt_str")]
    pub details: Option<String>,
}

/// The five drill-down subsets of the exceptions view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExceptionKind {
    MissingDates,
    Compliance,
    Defects,
    Partials,
    PriceOutliers,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 5] = [
        ExceptionKind::MissingDates,
        ExceptionKind::Compliance,
        ExceptionKind::Defects,
        ExceptionKind::Partials,
        ExceptionKind::PriceOutliers,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ExceptionKind::MissingDates => "missingDates",
            ExceptionKind::Compliance => "compliance",
            ExceptionKind::Defects => "defects",
            ExceptionKind::Partials => "partials",
            ExceptionKind::PriceOutliers => "priceOutliers",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExceptionSets {
    pub missing_dates: Vec<CanonicalRecord>,
    pub compliance: Vec<CanonicalRecord>,
    pub defects: Vec<CanonicalRecord>,
    pub partials: Vec<CanonicalRecord>,
    pub price_outliers: Vec<CanonicalRecord>,
}

impl ExceptionSets {
    pub fn get(&self, kind: ExceptionKind) -> &[CanonicalRecord] {
        match kind {
            ExceptionKind::MissingDates => &self.missing_dates,
            ExceptionKind::Compliance => &self.compliance,
            ExceptionKind::Defects => &self.defects,
            ExceptionKind::Partials => &self.partials,
            ExceptionKind::PriceOutliers => &self.price_outliers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct ExceptionRecord {
    #[serde(rename = "PoId")]
    #[tabled(rename = "PoId")]
    pub po_id: String,
    #[serde(rename = "Supplier")]
    #[tabled(rename = "Supplier")]
    pub supplier: String,
    #[serde(rename = "Category")]
    #[tabled(rename = "Category", display_with = "display_opt_str")]
    pub category: Option<String>,
    #[serde(rename = "Region")]
    #[tabled(rename = "Region", display_with = "display_opt_str")]
    pub region: Option<String>,
    #[serde(rename = "PoDate")]
    #[tabled(rename = "PoDate", display_with = "display_opt_date")]
    pub po_date: Option<NaiveDate>,
    #[serde(rename = "Issue")]
    #[tabled(rename = "Issue")]
    pub issue: ExceptionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallKpis {
    pub total_pos: usize,
    pub on_time_rate: f64,
    pub avg_days_late: f64,
    pub defect_rate: f64,
    pub compliance_gap_rate: f64,
    pub partial_order_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierCount {
    pub supplier: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendRiskPoint {
    pub supplier: String,
    pub risk_score: f64,
    pub spend: f64,
}

/// Coverage of each signal family in the loaded records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataDiagnostics {
    pub suppliers: usize,
    pub delivery_dates: usize,
    pub defects: usize,
    pub compliance: usize,
    pub quantities: usize,
    pub pricing: usize,
    pub notes: Vec<String>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SupplierRankingRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Supplier")]
    #[tabled(rename = "Supplier")]
    pub supplier: String,
    #[serde(rename = "TotalPOs")]
    #[tabled(rename = "TotalPOs")]
    pub total_pos: usize,
    #[serde(rename = "OnTimePct")]
    #[tabled(rename = "OnTimePct")]
    pub on_time_pct: String,
    #[serde(rename = "LatePct")]
    #[tabled(rename = "LatePct")]
    pub late_pct: String,
    #[serde(rename = "AvgDaysLate")]
    #[tabled(rename = "AvgDaysLate")]
    pub avg_days_late: String,
    #[serde(rename = "DefectPct")]
    #[tabled(rename = "DefectPct")]
    pub defect_pct: String,
    #[serde(rename = "CompliancePct")]
    #[tabled(rename = "CompliancePct")]
    pub compliance_pct: String,
    #[serde(rename = "Spend")]
    #[tabled(rename = "Spend")]
    pub spend: String,
    #[serde(rename = "RiskScore")]
    #[tabled(rename = "RiskScore")]
    pub risk_score: String,
    #[serde(rename = "RiskBand")]
    #[tabled(rename = "RiskBand")]
    pub risk_band: RiskBand,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub total_pos: usize,
    pub total_suppliers: usize,
    pub high_risk_suppliers: usize,
    pub total_issues: usize,
    pub kpis: OverallKpis,
    pub diagnostics: DataDiagnostics,
    pub active_filters: String,
}

fn display_opt_str(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

fn display_opt_f64(v: &Option<f64>) -> String {
    v.map(|d| format!("{:.1}", d)).unwrap_or_default()
}

fn display_opt_date(v: &Option<NaiveDate>) -> String {
    v.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mapping_covers_every_field_unmapped() {
        let mapping = ColumnMapping::default();
        assert_eq!(mapping.iter().count(), 18);
        assert_eq!(mapping.mapped_count(), 0);
    }

    #[test]
    fn stored_mapping_merges_over_default() {
        let json = r#"{"po_id":"PO","supplier":"Vendor"}"#;
        let mapping: ColumnMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.get(CanonicalField::PoId), Some("PO"));
        assert_eq!(mapping.get(CanonicalField::Supplier), Some("Vendor"));
        assert_eq!(mapping.get(CanonicalField::Region), None);
        assert_eq!(mapping.iter().count(), 18);
    }

    #[test]
    fn retain_headers_drops_stale_columns() {
        let mut mapping = ColumnMapping::default();
        mapping.set(CanonicalField::PoId, Some("PO".to_string()));
        mapping.set(CanonicalField::Region, Some("Gone".to_string()));
        mapping.retain_headers(&["PO".to_string()]);
        assert_eq!(mapping.get(CanonicalField::PoId), Some("PO"));
        assert_eq!(mapping.get(CanonicalField::Region), None);
    }

    #[test]
    fn band_boundaries_are_exact() {
        assert_eq!(RiskBand::from_score(33.9), RiskBand::Low);
        assert_eq!(RiskBand::from_score(34.0), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(66.9), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(67.0), RiskBand::High);
    }

    #[test]
    fn partial_requires_both_quantities() {
        let mut r = CanonicalRecord::new("1", "Acme");
        r.qty_received = Some(5.0);
        assert!(!r.is_partial());
        r.qty_ordered = Some(10.0);
        assert!(r.is_partial());
    }

    #[test]
    fn blank_issue_type_is_not_a_gap() {
        let mut r = CanonicalRecord::new("1", "Acme");
        r.compliance_issue_type = Some("   ".to_string());
        assert!(!r.has_compliance_gap());
        r.compliance_flag = Some(true);
        assert!(r.has_compliance_gap());
    }
}
