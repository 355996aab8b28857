use crate::metrics::{compute_overall_kpis, compute_supplier_metrics, data_diagnostics, weighted_risk};
use crate::outliers::flag_price_outliers;
use crate::types::{
    CanonicalRecord, ExceptionKind, ExceptionRecord, ExceptionSets, IssueType, MonthlyRiskPoint,
    MonthlySupplierRates, RiskBand, SummaryStats, SupplierIssue, SupplierMetric, SupplierRankingRow,
};
use crate::util::{format_number, format_percent, month_key, round_to};
use std::collections::BTreeMap;

/// Records grouped by `YYYY-MM` of their first available date, ascending.
/// Undated records are left out.
fn bucket_by_month<'a, I>(records: I) -> BTreeMap<String, Vec<CanonicalRecord>>
where
    I: IntoIterator<Item = &'a CanonicalRecord>,
{
    let mut buckets: BTreeMap<String, Vec<CanonicalRecord>> = BTreeMap::new();
    for r in records {
        if let Some(month) = month_key(r.reference_date()) {
            buckets.entry(month).or_default().push(r.clone());
        }
    }
    buckets
}

/// Monthly record-weighted risk. Every month is scored on its own, so the
/// days-late normalization uses that month's maximum.
pub fn compute_monthly_risk_trend(records: &[CanonicalRecord]) -> Vec<MonthlyRiskPoint> {
    bucket_by_month(records)
        .into_iter()
        .map(|(month, rows)| {
            let metrics = compute_supplier_metrics(&rows);
            MonthlyRiskPoint {
                month,
                risk_score: weighted_risk(&metrics),
            }
        })
        .collect()
}

/// Plain per-month late / defect / compliance rates for one supplier.
pub fn compute_supplier_monthly_rates(records: &[CanonicalRecord], supplier: &str) -> Vec<MonthlySupplierRates> {
    bucket_by_month(records.iter().filter(|r| r.supplier == supplier))
        .into_iter()
        .map(|(month, rows)| {
            let total = rows.len().max(1) as f64;
            let late = rows
                .iter()
                .filter(|r| matches!((r.promised_delivery_date, r.actual_delivery_date), (Some(p), Some(a)) if a > p))
                .count();
            let defects = rows.iter().filter(|r| r.is_defective()).count();
            let compliance = rows.iter().filter(|r| r.has_compliance_gap()).count();
            MonthlySupplierRates {
                month,
                late_rate: late as f64 / total,
                defect_rate: defects as f64 / total,
                compliance_gap_rate: compliance as f64 / total,
            }
        })
        .collect()
}

fn issue(r: &CanonicalRecord, issue_type: IssueType, details: impl Into<String>) -> SupplierIssue {
    SupplierIssue {
        po_id: r.po_id.clone(),
        supplier: r.supplier.clone(),
        issue_type,
        days_late: None,
        details: Some(details.into()),
    }
}

/// Every issue instance of every record. A record can appear once per
/// issue type it exhibits.
pub fn build_top_issues(records: &[CanonicalRecord]) -> Vec<SupplierIssue> {
    let outliers = flag_price_outliers(records);
    let mut issues = Vec::new();

    for r in records {
        if let Some(days) = r.days_late().filter(|d| *d > 0.0) {
            issues.push(SupplierIssue {
                days_late: Some(round_to(days, 1)),
                ..issue(r, IssueType::Late, format!("Late by {:.1} days", days))
            });
        }
        if r.is_defective() {
            let details = match r.defect_count {
                Some(count) => format!("Defects: {}", count),
                None => "Defect flagged".to_string(),
            };
            issues.push(issue(r, IssueType::Defect, details));
        }
        if r.has_compliance_gap() {
            let details = r
                .compliance_issue_type
                .clone()
                .unwrap_or_else(|| "Compliance gap".to_string());
            issues.push(issue(r, IssueType::Compliance, details));
        }
        if !r.has_delivery_dates() {
            issues.push(issue(r, IssueType::MissingDates, "Missing promised or actual date"));
        }
        if r.is_partial() {
            issues.push(issue(r, IssueType::Partial, "Partial order"));
        }
        if outliers.contains(&r.po_id) {
            issues.push(issue(r, IssueType::PriceOutlier, "Unit price outlier"));
        }
    }
    issues
}

/// The five drill-down subsets, using the same predicates as the issue list.
pub fn compute_exceptions(records: &[CanonicalRecord]) -> ExceptionSets {
    let outliers = flag_price_outliers(records);
    let subset = |pred: &dyn Fn(&CanonicalRecord) -> bool| -> Vec<CanonicalRecord> {
        records.iter().filter(|r| pred(r)).cloned().collect()
    };
    ExceptionSets {
        missing_dates: subset(&|r| !r.has_delivery_dates()),
        compliance: subset(&|r| r.has_compliance_gap()),
        defects: subset(&|r| r.is_defective()),
        partials: subset(&|r| r.is_partial()),
        price_outliers: subset(&|r| outliers.contains(&r.po_id)),
    }
}

/// Flattened rows for one exception subset, optionally narrowed by a
/// case-insensitive search over id, supplier, category and region.
pub fn exception_records(sets: &ExceptionSets, kind: ExceptionKind, search: Option<&str>) -> Vec<ExceptionRecord> {
    let needle = search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
    sets.get(kind)
        .iter()
        .filter(|r| match &needle {
            Some(needle) => format!(
                "{} {} {} {}",
                r.po_id,
                r.supplier,
                r.category.as_deref().unwrap_or(""),
                r.region.as_deref().unwrap_or("")
            )
            .to_lowercase()
            .contains(needle.as_str()),
            None => true,
        })
        .map(|r| ExceptionRecord {
            po_id: r.po_id.clone(),
            supplier: r.supplier.clone(),
            category: r.category.clone(),
            region: r.region.clone(),
            po_date: r.po_date,
            issue: kind,
        })
        .collect()
}

/// Presentation rows for the supplier ranking table.
pub fn supplier_ranking_rows(metrics: &[SupplierMetric]) -> Vec<SupplierRankingRow> {
    metrics
        .iter()
        .enumerate()
        .map(|(idx, m)| SupplierRankingRow {
            rank: idx + 1,
            supplier: m.supplier.clone(),
            total_pos: m.total_pos,
            on_time_pct: format_percent(m.on_time_rate, 1),
            late_pct: format_percent(m.late_rate, 1),
            avg_days_late: format_number(m.avg_days_late, 1),
            defect_pct: format_percent(m.defect_rate, 1),
            compliance_pct: format_percent(m.compliance_gap_rate, 1),
            spend: format_number(m.spend, 2),
            risk_score: format_number(m.risk_score, 1),
            risk_band: m.risk_band,
        })
        .collect()
}

pub fn generate_summary(
    records: &[CanonicalRecord],
    metrics: &[SupplierMetric],
    issues: &[SupplierIssue],
    active_filters: String,
) -> SummaryStats {
    SummaryStats {
        total_pos: records.len(),
        total_suppliers: metrics.len(),
        high_risk_suppliers: metrics.iter().filter(|m| m.risk_band == RiskBand::High).count(),
        total_issues: issues.len(),
        kpis: compute_overall_kpis(records),
        diagnostics: data_diagnostics(records),
        active_filters,
    }
}
