// Per-supplier aggregation and risk scoring.
//
// Scoring runs in three phases over the current view:
// 1. one pass folding records into raw per-supplier counters,
// 2. a global reduction for the largest average days late,
// 3. per-supplier rates and the weighted score.
// Phase 3 depends on the maximum from phase 2, so the whole view must be
// aggregated before any supplier can be scored.
use crate::outliers::flag_price_outliers;
use crate::types::{
    CanonicalRecord, DataDiagnostics, OverallKpis, RiskBand, SpendRiskPoint, SupplierCount,
    SupplierMetric,
};
use crate::util::{clamp01, round_to, weighted_mean};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

pub const WEIGHT_LATE_RATE: f64 = 0.30;
pub const WEIGHT_DAYS_LATE: f64 = 0.15;
pub const WEIGHT_MISSING_DELIVERY: f64 = 0.10;
pub const WEIGHT_DEFECT_RATE: f64 = 0.20;
pub const WEIGHT_COMPLIANCE_GAP: f64 = 0.15;
pub const WEIGHT_PARTIAL_ORDER: f64 = 0.05;
pub const WEIGHT_PRICE_OUTLIER: f64 = 0.05;

/// One weighted input to the risk score. Components whose signal was never
/// observed for a supplier are left out of both numerator and denominator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskComponent {
    pub name: &'static str,
    pub weight: f64,
    pub value: f64,
    pub available: bool,
}

#[derive(Debug, Clone, Default)]
struct SupplierAgg {
    supplier: String,
    total_pos: usize,
    late_deliveries: usize,
    defects: usize,
    compliance_gaps: usize,
    partial_orders: usize,
    price_outliers: usize,
    spend: f64,
    deliveries_with_dates: usize,
    total_days_late_sum: f64,
    on_time_count: usize,
    on_time_denominator: usize,
    missing_deliveries: usize,
}

impl SupplierAgg {
    fn new(supplier: &str) -> Self {
        Self {
            supplier: supplier.to_string(),
            ..Self::default()
        }
    }

    fn add(&mut self, r: &CanonicalRecord, outliers: &HashSet<String>) {
        self.total_pos += 1;

        match (r.promised_delivery_date, r.actual_delivery_date) {
            (Some(promised), Some(actual)) => {
                self.deliveries_with_dates += 1;
                self.on_time_denominator += 1;
                self.total_days_late_sum += r.days_late().unwrap_or(0.0).max(0.0);
                if actual > promised {
                    self.late_deliveries += 1;
                } else {
                    self.on_time_count += 1;
                }
            }
            _ => {
                self.missing_deliveries += 1;
                if let Some(status) = r.delivery_status.as_deref().map(str::to_lowercase) {
                    self.add_status(&status);
                }
            }
        }

        if r.is_defective() {
            self.defects += 1;
        }
        if r.has_compliance_gap() {
            self.compliance_gaps += 1;
        }
        if r.is_partial() {
            self.partial_orders += 1;
        }
        if outliers.contains(&r.po_id) {
            self.price_outliers += 1;
        }
        if let Some(cost) = r.total_cost {
            self.spend += cost;
        }
    }

    // Keyword fallback for undated deliveries. A late keyword counts as a late
    // delivery, so it also raises the late rate when dated deliveries exist.
    fn add_status(&mut self, status: &str) {
        if status.is_empty() {
            return;
        }
        self.on_time_denominator += 1;
        if status.contains("late") || status.contains("delay") || status.contains("cancel") {
            self.late_deliveries += 1;
        }
        if (status.contains("on") && status.contains("time"))
            || (status.contains("delivered") && !status.contains("late"))
        {
            self.on_time_count += 1;
        }
    }

    fn avg_days_late(&self) -> f64 {
        if self.deliveries_with_dates == 0 {
            return 0.0;
        }
        self.total_days_late_sum / self.deliveries_with_dates as f64
    }

    fn rate(&self, count: usize) -> f64 {
        if self.total_pos == 0 {
            return 0.0;
        }
        count as f64 / self.total_pos as f64
    }

    // Status-based lates share the numerator with dated ones, so the ratio
    // can exceed 1 and is capped.
    fn late_rate(&self) -> f64 {
        if self.deliveries_with_dates == 0 {
            return 0.0;
        }
        clamp01(self.late_deliveries as f64 / self.deliveries_with_dates as f64)
    }

    fn on_time_rate(&self) -> f64 {
        if self.on_time_denominator == 0 {
            return 0.0;
        }
        self.on_time_count as f64 / self.on_time_denominator as f64
    }

    fn components(&self, max_avg_days_late: f64) -> [RiskComponent; 7] {
        let dated = self.deliveries_with_dates > 0;
        let normalized_days_late = if max_avg_days_late > 0.0 {
            clamp01(self.avg_days_late() / max_avg_days_late)
        } else {
            0.0
        };
        [
            RiskComponent {
                name: "late_rate",
                weight: WEIGHT_LATE_RATE,
                value: self.late_rate(),
                available: dated,
            },
            RiskComponent {
                name: "avg_days_late",
                weight: WEIGHT_DAYS_LATE,
                value: normalized_days_late,
                available: dated,
            },
            RiskComponent {
                name: "missing_delivery_rate",
                weight: WEIGHT_MISSING_DELIVERY,
                value: self.rate(self.missing_deliveries),
                available: self.missing_deliveries > 0,
            },
            RiskComponent {
                name: "defect_rate",
                weight: WEIGHT_DEFECT_RATE,
                value: self.rate(self.defects),
                available: self.defects > 0,
            },
            RiskComponent {
                name: "compliance_gap_rate",
                weight: WEIGHT_COMPLIANCE_GAP,
                value: self.rate(self.compliance_gaps),
                available: self.compliance_gaps > 0,
            },
            RiskComponent {
                name: "partial_order_rate",
                weight: WEIGHT_PARTIAL_ORDER,
                value: self.rate(self.partial_orders),
                available: self.partial_orders > 0,
            },
            RiskComponent {
                name: "price_outlier_rate",
                weight: WEIGHT_PRICE_OUTLIER,
                value: self.rate(self.price_outliers),
                available: self.price_outliers > 0,
            },
        ]
    }

    fn into_metric(self, max_avg_days_late: f64) -> SupplierMetric {
        let risk_score = risk_score(&self.components(max_avg_days_late));
        SupplierMetric {
            total_pos: self.total_pos,
            on_time_rate: self.on_time_rate(),
            late_rate: self.late_rate(),
            avg_days_late: self.avg_days_late(),
            missing_delivery_rate: self.rate(self.missing_deliveries),
            defect_rate: self.rate(self.defects),
            compliance_gap_rate: self.rate(self.compliance_gaps),
            partial_order_rate: self.rate(self.partial_orders),
            price_outlier_rate: self.rate(self.price_outliers),
            risk_score,
            risk_band: RiskBand::from_score(risk_score),
            late_deliveries: self.late_deliveries,
            defects: self.defects,
            compliance_gaps: self.compliance_gaps,
            partial_orders: self.partial_orders,
            spend: self.spend,
            supplier: self.supplier,
        }
    }
}

/// 0..100 score re-normalized over the available components, one decimal.
pub fn risk_score(components: &[RiskComponent]) -> f64 {
    let (weighted, total_weight) = components
        .iter()
        .filter(|c| c.available)
        .fold((0.0, 0.0), |(sum, w), c| (sum + c.weight * c.value, w + c.weight));
    if total_weight <= 0.0 {
        return 0.0;
    }
    round_to(100.0 * weighted / total_weight, 1)
}

fn aggregate(records: &[CanonicalRecord]) -> Vec<SupplierAgg> {
    let outliers = flag_price_outliers(records);
    let mut by_supplier: IndexMap<&str, SupplierAgg> = IndexMap::new();
    for r in records {
        by_supplier
            .entry(r.supplier.as_str())
            .or_insert_with(|| SupplierAgg::new(&r.supplier))
            .add(r, &outliers);
    }
    by_supplier.into_values().collect()
}

/// One metric per supplier in `records`, highest risk first. Ties keep the
/// order in which suppliers first appear.
pub fn compute_supplier_metrics(records: &[CanonicalRecord]) -> Vec<SupplierMetric> {
    let aggs = aggregate(records);
    let max_avg_days_late = aggs
        .iter()
        .map(SupplierAgg::avg_days_late)
        .fold(0.0, f64::max);

    let mut metrics: Vec<SupplierMetric> = aggs
        .into_iter()
        .map(|agg| agg.into_metric(max_avg_days_late))
        .collect();
    metrics.sort_by(|a, b| b.risk_score.partial_cmp(&a.risk_score).unwrap_or(Ordering::Equal));
    tracing::debug!(
        records = records.len(),
        suppliers = metrics.len(),
        max_avg_days_late,
        "computed supplier metrics"
    );
    metrics
}

/// Record-weighted risk across suppliers, one decimal.
pub fn weighted_risk(metrics: &[SupplierMetric]) -> f64 {
    let score = weighted_mean(metrics.iter().map(|m| (m.risk_score, m.total_pos as f64)));
    round_to(score, 1)
}

pub fn compute_overall_kpis(records: &[CanonicalRecord]) -> OverallKpis {
    let metrics = compute_supplier_metrics(records);
    let mean = |f: fn(&SupplierMetric) -> f64| {
        weighted_mean(metrics.iter().map(|m| (f(m), m.total_pos as f64)))
    };
    OverallKpis {
        total_pos: records.len(),
        on_time_rate: mean(|m| m.on_time_rate),
        avg_days_late: mean(|m| m.avg_days_late),
        defect_rate: mean(|m| m.defect_rate),
        compliance_gap_rate: mean(|m| m.compliance_gap_rate),
        partial_order_rate: mean(|m| m.partial_order_rate),
    }
}

pub fn late_by_supplier(records: &[CanonicalRecord]) -> Vec<SupplierCount> {
    compute_supplier_metrics(records)
        .into_iter()
        .map(|m| SupplierCount {
            supplier: m.supplier,
            count: m.late_deliveries,
        })
        .collect()
}

pub fn defects_by_supplier(records: &[CanonicalRecord]) -> Vec<SupplierCount> {
    compute_supplier_metrics(records)
        .into_iter()
        .map(|m| SupplierCount {
            supplier: m.supplier,
            count: m.defects,
        })
        .collect()
}

/// Suppliers with recorded spend, paired with their risk score.
pub fn spend_vs_risk(records: &[CanonicalRecord]) -> Vec<SpendRiskPoint> {
    compute_supplier_metrics(records)
        .into_iter()
        .filter(|m| m.spend > 0.0)
        .map(|m| SpendRiskPoint {
            risk_score: m.risk_score,
            spend: round_to(m.spend, 2),
            supplier: m.supplier,
        })
        .collect()
}

pub fn data_diagnostics(records: &[CanonicalRecord]) -> DataDiagnostics {
    let count = |pred: &dyn Fn(&CanonicalRecord) -> bool| records.iter().filter(|r| pred(r)).count();
    let any = |pred: &dyn Fn(&CanonicalRecord) -> bool| records.iter().any(pred);

    let suppliers: BTreeSet<&str> = records.iter().map(|r| r.supplier.as_str()).collect();
    let has_promise = any(&|r| r.promised_delivery_date.is_some());
    let has_actual = any(&|r| r.actual_delivery_date.is_some());
    let has_status = any(&|r| r.delivery_status.is_some());
    let has_defects = any(&|r| r.defect_flag.is_some() || r.defect_count.is_some());
    let has_compliance = any(&|r| r.compliance_flag.is_some());
    let has_total_cost = any(&|r| r.total_cost.is_some());

    let mut notes = Vec::new();
    if !has_promise || !has_actual {
        notes.push("Delivery dates not present in dataset".to_string());
        if !has_status {
            notes.push("Delivery status not present in dataset".to_string());
        }
    }
    if !has_defects {
        notes.push("Defect data missing".to_string());
    }
    if !has_compliance {
        notes.push("Compliance data missing".to_string());
    }
    if !has_total_cost {
        notes.push("Pricing data missing".to_string());
    }

    DataDiagnostics {
        suppliers: suppliers.len(),
        delivery_dates: count(&|r| r.promised_delivery_date.is_some() || r.actual_delivery_date.is_some()),
        defects: count(&|r| r.defect_flag.is_some() || r.defect_count.is_some()),
        compliance: count(&|r| r.compliance_flag.is_some()),
        quantities: count(&|r| r.qty_ordered.is_some() || r.qty_received.is_some() || r.partial_order_flag.is_some()),
        pricing: count(&|r| r.total_cost.is_some() || r.unit_price.is_some()),
        notes,
    }
}
