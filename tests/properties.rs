use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use supplier_risk::mapping::auto_map;
use supplier_risk::metrics::{compute_supplier_metrics, weighted_risk};
use supplier_risk::reports::compute_monthly_risk_trend;
use supplier_risk::types::{CanonicalRecord, RiskBand};
use supplier_risk::util::{parse_boolean, parse_date, parse_number};

#[derive(Debug, Clone)]
struct RecordSeed {
    supplier: usize,
    day: i64,
    promised_in: Option<i64>,
    delivered_after: Option<i64>,
    status: Option<&'static str>,
    defect_count: Option<f64>,
    compliance_flag: Option<bool>,
    qty: Option<(f64, f64)>,
    unit_price: Option<f64>,
}

fn seed() -> impl Strategy<Value = RecordSeed> {
    (
        0usize..4,
        0i64..90,
        proptest::option::of(0i64..30),
        proptest::option::of(-10i64..40),
        proptest::option::of(prop::sample::select(vec!["Delivered", "Late", "On Time", "Cancelled", ""])),
        proptest::option::of(0.0f64..5.0),
        proptest::option::of(any::<bool>()),
        proptest::option::of((1.0f64..100.0, 0.0f64..100.0)),
        proptest::option::of(0.5f64..500.0),
    )
        .prop_map(
            |(supplier, day, promised_in, delivered_after, status, defect_count, compliance_flag, qty, unit_price)| {
                RecordSeed {
                    supplier,
                    day,
                    promised_in,
                    delivered_after,
                    status,
                    defect_count,
                    compliance_flag,
                    qty,
                    unit_price,
                }
            },
        )
}

fn build(seeds: &[RecordSeed], single_month: bool) -> Vec<CanonicalRecord> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    seeds
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut r = CanonicalRecord::new(format!("PO-{}", i), format!("Supplier {}", s.supplier));
            let day = if single_month { s.day % 28 } else { s.day };
            let po_date = base + Duration::days(day);
            r.po_date = Some(po_date);
            if let Some(lead) = s.promised_in {
                let promised = po_date + Duration::days(lead);
                r.promised_delivery_date = Some(promised);
                r.actual_delivery_date = s.delivered_after.map(|d| promised + Duration::days(d));
            }
            r.delivery_status = s.status.filter(|st| !st.is_empty()).map(str::to_string);
            r.defect_count = s.defect_count;
            r.compliance_flag = s.compliance_flag;
            if let Some((ordered, received)) = s.qty {
                r.qty_ordered = Some(ordered);
                r.qty_received = Some(received);
            }
            r.unit_price = s.unit_price;
            r.category = Some(if s.supplier % 2 == 0 { "Steel" } else { "Paper" }.to_string());
            r
        })
        .collect()
}

proptest! {
    #[test]
    fn parsers_never_panic(s in "\\PC{0,40}") {
        let _ = parse_number(Some(&s));
        let _ = parse_boolean(Some(&s));
        let _ = parse_date(Some(&s));
    }

    #[test]
    fn date_like_input_never_panics(a in 0u32..100, b in 0u32..100, y in 0u32..10000, sep in prop::sample::select(vec!['/', '-'])) {
        let s = format!("{}{}{}{}{}", a, sep, b, sep, y);
        let _ = parse_date(Some(&s));
    }

    #[test]
    fn scores_stay_in_range(seeds in prop::collection::vec(seed(), 1..40)) {
        let records = build(&seeds, false);
        let metrics = compute_supplier_metrics(&records);
        let total: usize = metrics.iter().map(|m| m.total_pos).sum();
        prop_assert_eq!(total, records.len());
        for m in &metrics {
            prop_assert!((0.0..=100.0).contains(&m.risk_score), "score {} out of range", m.risk_score);
            prop_assert_eq!(m.risk_band, RiskBand::from_score(m.risk_score));
            prop_assert!((0.0..=1.0).contains(&m.late_rate));
            prop_assert!((0.0..=1.0).contains(&m.on_time_rate));
        }
        prop_assert!(metrics.windows(2).all(|w| w[0].risk_score >= w[1].risk_score));
    }

    #[test]
    fn single_month_trend_matches_overall(seeds in prop::collection::vec(seed(), 1..30)) {
        let records = build(&seeds, true);
        let trend = compute_monthly_risk_trend(&records);
        prop_assert_eq!(trend.len(), 1);
        let overall = weighted_risk(&compute_supplier_metrics(&records));
        prop_assert_eq!(trend[0].risk_score.to_bits(), overall.to_bits());
    }

    #[test]
    fn auto_map_is_idempotent(
        headers in prop::collection::vec("[A-Za-z_ #]{0,24}", 0..12),
        prefer_known in any::<bool>(),
    ) {
        prop_assert_eq!(auto_map(&headers, prefer_known), auto_map(&headers, prefer_known));
    }
}
