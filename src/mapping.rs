// Header -> canonical field auto-mapping.
//
// Two suggestion dictionaries are matched against normalized headers: a
// generic list of human phrasings, and the literal column names used by the
// known reference procurement dataset. Whichever list is applied last wins.
use crate::types::{CanonicalField, ColumnMapping};
use crate::util::normalize_header;

/// Source hint used when the bundled sample file is loaded.
pub const SAMPLE_SOURCE: &str = "/sample/procurement.csv";

pub const KNOWN_DATASET_MIN_ROWS: usize = 600;

const KNOWN_DATASET_MARKERS: &[&str] = &[
    "supplier",
    "category",
    "purchase order id",
    "po id",
    "po_date",
    "promised_delivery_date",
];

fn generic_suggestions(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::PoId => &["po id", "purchase order", "order id", "po#", "po number", "purchase_order_id", "po_id"],
        CanonicalField::Supplier => &["supplier", "vendor", "supplier name", "vendor name"],
        CanonicalField::PoDate => &["po date", "order date", "purchase date", "created date", "po_date", "order_date"],
        CanonicalField::PromisedDeliveryDate => &[
            "promised delivery",
            "promise date",
            "expected delivery",
            "due date",
            "promised_delivery_date",
        ],
        CanonicalField::ActualDeliveryDate => &[
            "actual delivery",
            "delivered date",
            "receipt date",
            "arrival date",
            "actual_delivery_date",
            "delivery_date",
        ],
        CanonicalField::DeliveryStatus => &["delivery status", "on time", "status", "delivery_status", "order_status"],
        CanonicalField::DefectFlag => &["defect flag", "defect", "defective", "quality issue", "defect_flag", "defect_rate"],
        CanonicalField::DefectCount => &["defect count", "defects", "defect qty", "defective_units"],
        CanonicalField::ComplianceFlag => &[
            "compliance flag",
            "compliance",
            "noncompliance",
            "violation",
            "compliance_flag",
            "policy_violation",
        ],
        CanonicalField::ComplianceIssueType => &["compliance issue", "issue type", "violation type"],
        CanonicalField::PartialOrderFlag => &["partial order", "partial", "backorder", "short shipped", "partial_order_flag"],
        CanonicalField::QtyOrdered => &["qty ordered", "quantity ordered", "ordered qty", "order qty", "quantity_ordered", "quantity"],
        CanonicalField::QtyReceived => &["qty received", "quantity received", "received qty", "receipt qty", "quantity_received"],
        CanonicalField::UnitPrice => &["unit price", "price", "unit cost", "item price", "unit_price"],
        CanonicalField::TotalCost => &[
            "total cost",
            "total spend",
            "total amount",
            "po total",
            "total_cost",
            "spend",
            "negotiated_price",
        ],
        CanonicalField::SavingsAmount => &["savings", "savings amount", "savings_amount"],
        CanonicalField::Category => &["category", "commodity", "product category", "item_category"],
        CanonicalField::Region => &["region", "location", "site", "country"],
    }
}

fn known_dataset_suggestions(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::Supplier => &["supplier"],
        CanonicalField::Category => &["category", "item_category"],
        CanonicalField::PoId => &["purchase_order_id", "po_id"],
        CanonicalField::PoDate => &["po_date", "order_date"],
        CanonicalField::PromisedDeliveryDate => &["promised_delivery_date"],
        CanonicalField::ActualDeliveryDate => &["actual_delivery_date", "delivery_date"],
        CanonicalField::DeliveryStatus => &["delivery_status", "order_status"],
        CanonicalField::DefectFlag => &["defect_flag", "defect_rate"],
        CanonicalField::ComplianceFlag => &["compliance_flag", "policy_violation", "compliance"],
        CanonicalField::QtyOrdered => &["quantity_ordered", "quantity"],
        CanonicalField::UnitPrice => &["unit_price"],
        CanonicalField::TotalCost => &["total_cost", "spend", "negotiated_price"],
        CanonicalField::SavingsAmount => &["savings"],
        CanonicalField::Region => &["region"],
        _ => &[],
    }
}

/// First header (in source order) whose normalized form contains any of the
/// normalized suggestions.
fn find_match<'a>(
    normalized: &'a [(String, String)],
    suggestions: &[&str],
) -> Option<&'a str> {
    let suggestions: Vec<String> = suggestions.iter().map(|s| normalize_header(s)).collect();
    normalized
        .iter()
        .find(|(_, key)| suggestions.iter().any(|s| key.contains(s.as_str())))
        .map(|(header, _)| header.as_str())
}

fn apply_suggestions(
    mapping: &mut ColumnMapping,
    normalized: &[(String, String)],
    suggestions: fn(CanonicalField) -> &'static [&'static str],
) {
    for field in CanonicalField::ALL {
        if let Some(header) = find_match(normalized, suggestions(field)) {
            mapping.set(field, Some(header.to_string()));
        }
    }
}

/// Build a mapping for `headers`.
///
/// With `prefer_known_dataset` the generic list runs first and the literal
/// reference-dataset names overwrite it; otherwise the order is reversed.
pub fn auto_map(headers: &[String], prefer_known_dataset: bool) -> ColumnMapping {
    let normalized: Vec<(String, String)> = headers
        .iter()
        .map(|h| (h.clone(), normalize_header(h)))
        .collect();

    let mut mapping = ColumnMapping::default();
    if prefer_known_dataset {
        apply_suggestions(&mut mapping, &normalized, generic_suggestions);
        apply_suggestions(&mut mapping, &normalized, known_dataset_suggestions);
    } else {
        apply_suggestions(&mut mapping, &normalized, known_dataset_suggestions);
        apply_suggestions(&mut mapping, &normalized, generic_suggestions);
    }
    tracing::debug!(
        mapped = mapping.mapped_count(),
        prefer_known_dataset,
        "auto-mapped headers"
    );
    mapping
}

/// Whether the headers look like the known reference dataset.
pub fn detect_known_dataset(headers: &[String], row_count: usize, source_hint: Option<&str>) -> bool {
    detect_known_dataset_with(headers, row_count, source_hint, KNOWN_DATASET_MIN_ROWS)
}

pub fn detect_known_dataset_with(
    headers: &[String],
    row_count: usize,
    source_hint: Option<&str>,
    min_rows: usize,
) -> bool {
    if source_hint == Some(SAMPLE_SOURCE) {
        return true;
    }
    if row_count < min_rows {
        return false;
    }
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    KNOWN_DATASET_MARKERS.iter().any(|marker| {
        let marker = normalize_header(marker);
        normalized.iter().any(|h| h.contains(&marker))
    })
}

/// Coarse confidence: share of canonical fields that ended up mapped.
pub fn mapping_confidence(mapping: &ColumnMapping, headers: &[String]) -> f64 {
    if headers.is_empty() {
        return 0.0;
    }
    mapping.mapped_count() as f64 / CanonicalField::ALL.len() as f64
}

/// Required fields that are unmapped or point at a header not in `headers`.
pub fn missing_required(mapping: &ColumnMapping, headers: &[String]) -> Vec<CanonicalField> {
    CanonicalField::ALL
        .into_iter()
        .filter(|f| f.is_required())
        .filter(|f| !mapping.get(*f).is_some_and(|h| headers.iter().any(|x| x == h)))
        .collect()
}

pub fn has_required_mapping(mapping: &ColumnMapping, headers: &[String]) -> bool {
    missing_required(mapping, headers).is_empty()
}
