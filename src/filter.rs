// View filters over the canonical record set.
//
// Filtering produces a new record vector; the loaded set is never touched,
// so every filtered view is re-aggregated from scratch.
use crate::types::CanonicalRecord;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Picker value meaning "no filter".
pub const ALL: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDimension {
    Supplier,
    Category,
    Region,
}

impl FilterDimension {
    fn value<'a>(&self, record: &'a CanonicalRecord) -> Option<&'a str> {
        match self {
            FilterDimension::Supplier => Some(record.supplier.as_str()),
            FilterDimension::Category => record.category.as_deref(),
            FilterDimension::Region => record.region.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub supplier: Option<String>,
    pub category: Option<String>,
    pub region: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Blank or `All` selections become `None`.
fn selection(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != ALL)
}

impl Filters {
    pub fn new(
        supplier: Option<String>,
        category: Option<String>,
        region: Option<String>,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Self {
        Self {
            supplier: selection(supplier),
            category: selection(category),
            region: selection(region),
            date_from,
            date_to,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Filters::default()
    }

    pub fn matches(&self, record: &CanonicalRecord) -> bool {
        let exact = |want: &Option<String>, have: Option<&str>| match want {
            Some(want) => have == Some(want.as_str()),
            None => true,
        };
        if !exact(&self.supplier, Some(record.supplier.as_str()))
            || !exact(&self.category, record.category.as_deref())
            || !exact(&self.region, record.region.as_deref())
        {
            return false;
        }
        if self.date_from.is_none() && self.date_to.is_none() {
            return true;
        }
        let Some(date) = record.po_date else {
            return false;
        };
        self.date_from.map_or(true, |from| date >= from) && self.date_to.map_or(true, |to| date <= to)
    }

    /// `Supplier=X, Category=Y, Region=Z, Date=from to to`, or `None`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(s) = &self.supplier {
            parts.push(format!("Supplier={}", s));
        }
        if let Some(c) = &self.category {
            parts.push(format!("Category={}", c));
        }
        if let Some(r) = &self.region {
            parts.push(format!("Region={}", r));
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let bound = |d: Option<NaiveDate>| {
                d.map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "...".to_string())
            };
            parts.push(format!("Date={} to {}", bound(self.date_from), bound(self.date_to)));
        }
        if parts.is_empty() {
            "None".to_string()
        } else {
            parts.join(", ")
        }
    }
}

pub fn apply_filters(records: &[CanonicalRecord], filters: &Filters) -> Vec<CanonicalRecord> {
    let filtered: Vec<CanonicalRecord> = records.iter().filter(|r| filters.matches(r)).cloned().collect();
    tracing::debug!(
        before = records.len(),
        after = filtered.len(),
        filters = %filters.describe(),
        "applied filters"
    );
    filtered
}

/// Sorted distinct non-blank values for a filter picker.
pub fn unique_options(records: &[CanonicalRecord], dimension: FilterDimension) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| dimension.value(r))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
