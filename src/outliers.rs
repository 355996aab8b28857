// Unit-price outlier detection with Tukey's fence.
//
// One model is fitted over every priced record, and one per
// (category, month) group. A record is judged against its group model when
// that group has one, otherwise against the global model.
use crate::types::CanonicalRecord;
use crate::util::{month_key, quantile};
use std::collections::{HashMap, HashSet};

const MIN_SAMPLES: usize = 4;
const FENCE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierModel {
    pub lower: f64,
    pub upper: f64,
}

impl OutlierModel {
    /// `None` for fewer than four samples or a zero interquartile range.
    pub fn fit(values: &[f64]) -> Option<Self> {
        if values.len() < MIN_SAMPLES {
            return None;
        }
        let q1 = quantile(values, 0.25);
        let q3 = quantile(values, 0.75);
        let iqr = q3 - q1;
        if iqr == 0.0 {
            return None;
        }
        Some(Self {
            lower: q1 - FENCE * iqr,
            upper: q3 + FENCE * iqr,
        })
    }

    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

fn group_key(record: &CanonicalRecord) -> Option<(String, String)> {
    let category = record.category.as_ref()?;
    let month = month_key(record.reference_date())?;
    Some((category.clone(), month))
}

/// Identifiers of records whose unit price falls outside their fence.
pub fn flag_price_outliers(records: &[CanonicalRecord]) -> HashSet<String> {
    let mut global: Vec<f64> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<f64>> = HashMap::new();

    for r in records {
        let Some(price) = r.unit_price else { continue };
        global.push(price);
        if let Some(key) = group_key(r) {
            groups.entry(key).or_default().push(price);
        }
    }

    let global_model = OutlierModel::fit(&global);
    let group_models: HashMap<(String, String), OutlierModel> = groups
        .into_iter()
        .filter_map(|(key, values)| OutlierModel::fit(&values).map(|m| (key, m)))
        .collect();

    let mut outliers = HashSet::new();
    for r in records {
        let Some(price) = r.unit_price else { continue };
        let model = group_key(r)
            .and_then(|key| group_models.get(&key).copied())
            .or(global_model);
        if model.is_some_and(|m| m.is_outlier(price)) {
            outliers.insert(r.po_id.clone());
        }
    }
    tracing::debug!(
        priced = global.len(),
        groups = group_models.len(),
        flagged = outliers.len(),
        "price outlier pass"
    );
    outliers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn priced(id: &str, category: Option<&str>, month: u32, price: f64) -> CanonicalRecord {
        let mut r = CanonicalRecord::new(id, "Acme");
        r.category = category.map(str::to_string);
        r.po_date = NaiveDate::from_ymd_opt(2024, month, 1);
        r.unit_price = Some(price);
        r
    }

    #[test]
    fn flags_extreme_price_in_group() {
        let mut records: Vec<_> = (0..5)
            .map(|i| priced(&format!("p{}", i), Some("Steel"), 1, 10.0))
            .collect();
        records.push(priced("big", Some("Steel"), 1, 1000.0));
        // Same-priced group has IQR 0; add spread so the group model exists.
        records[0].unit_price = Some(9.0);
        records[1].unit_price = Some(11.0);

        let flagged = flag_price_outliers(&records);
        assert!(flagged.contains("big"));
        assert_eq!(flagged.len(), 1);
    }

    #[test]
    fn uniform_group_with_spike_falls_back_to_global() {
        // Q1 = Q3 = 10 gives IQR 0 for the group, so the global model decides;
        // the global sample has spread from the second category.
        let mut records: Vec<_> = (0..5)
            .map(|i| priced(&format!("p{}", i), Some("Steel"), 1, 10.0))
            .collect();
        records.push(priced("big", Some("Steel"), 1, 1000.0));
        for (i, p) in [8.0, 9.0, 11.0, 12.0].into_iter().enumerate() {
            records.push(priced(&format!("o{}", i), Some("Paper"), 2, p));
        }
        let flagged = flag_price_outliers(&records);
        assert!(flagged.contains("big"));
        assert!((0..5).all(|i| !flagged.contains(&format!("p{}", i))));
    }

    #[test]
    fn small_groups_never_flag() {
        let records = vec![
            priced("a", Some("Steel"), 1, 10.0),
            priced("b", Some("Steel"), 1, 10.0),
            priced("c", Some("Steel"), 1, 1000.0),
        ];
        assert!(flag_price_outliers(&records).is_empty());
    }

    #[test]
    fn group_model_takes_precedence_over_global() {
        // Global spread is wide, so 100 is inside the global fence but far
        // outside the tight Steel/January group.
        let mut records = vec![
            priced("s1", Some("Steel"), 1, 10.0),
            priced("s2", Some("Steel"), 1, 11.0),
            priced("s3", Some("Steel"), 1, 12.0),
            priced("s4", Some("Steel"), 1, 13.0),
            priced("s5", Some("Steel"), 1, 100.0),
        ];
        for (i, p) in [50.0, 150.0, 250.0, 350.0, 450.0].into_iter().enumerate() {
            records.push(priced(&format!("g{}", i), None, 1, p));
        }
        let flagged = flag_price_outliers(&records);
        assert!(flagged.contains("s5"));
        let global: Vec<f64> = records.iter().filter_map(|r| r.unit_price).collect();
        assert!(!OutlierModel::fit(&global).unwrap().is_outlier(100.0));
    }

    #[test]
    fn zero_iqr_yields_no_model() {
        assert_eq!(OutlierModel::fit(&[5.0, 5.0, 5.0, 5.0, 5.0]), None);
        assert_eq!(OutlierModel::fit(&[1.0, 2.0, 3.0]), None);
    }
}
