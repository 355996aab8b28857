use crate::error::{Result, RiskError};
use crate::types::{CanonicalField, CanonicalRecord, ColumnMapping};
use crate::util::{coerce_text, parse_boolean, parse_date, parse_number, round_to};
use csv::ReaderBuilder;
use indexmap::IndexMap;
use std::io::Read;
use std::path::Path;

pub const UNKNOWN_SUPPLIER: &str = "Unknown Supplier";

/// Raw cells keyed by (trimmed) source header.
pub type RawRow = IndexMap<String, String>;

/// A parsed CSV: trimmed headers plus one trimmed map per data row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub synthetic_ids: usize,
    pub unknown_suppliers: usize,
    pub backfilled_costs: usize,
    pub validation_fallbacks: usize,
}

pub fn read_csv(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| RiskError::io(path, e))?;
    let table = read_csv_from(file)?;
    tracing::info!(
        path = %path.display(),
        rows = table.rows.len(),
        columns = table.headers.len(),
        "loaded CSV"
    );
    Ok(table)
}

/// Reads headered CSV, trimming headers and cells. Short rows simply lack
/// the trailing columns.
pub fn read_csv_from<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();
        rows.push(row);
    }
    Ok(RawTable { headers, rows })
}

/// Trim every key and value of a raw row.
pub fn normalize_row(row: &RawRow) -> RawRow {
    row.iter()
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn cell<'a>(row: &'a RawRow, mapping: &ColumnMapping, field: CanonicalField) -> Option<&'a str> {
    mapping
        .get(field)
        .and_then(|header| row.get(header))
        .map(String::as_str)
}

/// Convert one raw row into a canonical record. `index` is the 0-based row
/// position, used for the synthetic `row-N` identifier.
pub fn to_canonical(raw_row: &RawRow, mapping: &ColumnMapping, index: usize) -> CanonicalRecord {
    to_canonical_with_report(raw_row, mapping, index, &mut LoadReport::default())
}

fn to_canonical_with_report(
    raw_row: &RawRow,
    mapping: &ColumnMapping,
    index: usize,
    report: &mut LoadReport,
) -> CanonicalRecord {
    let cleaned = normalize_row(raw_row);
    let get = |field| cell(&cleaned, mapping, field);

    let po_id = match coerce_text(get(CanonicalField::PoId)) {
        Some(id) => id,
        None => {
            report.synthetic_ids += 1;
            format!("row-{}", index + 1)
        }
    };
    let supplier = match coerce_text(get(CanonicalField::Supplier)) {
        Some(s) => s,
        None => {
            report.unknown_suppliers += 1;
            UNKNOWN_SUPPLIER.to_string()
        }
    };

    let mut record = CanonicalRecord::new(po_id, supplier);
    record.po_date = parse_date(get(CanonicalField::PoDate));
    record.promised_delivery_date = parse_date(get(CanonicalField::PromisedDeliveryDate));
    record.actual_delivery_date = parse_date(get(CanonicalField::ActualDeliveryDate));
    record.delivery_status = coerce_text(get(CanonicalField::DeliveryStatus));
    record.defect_flag = parse_boolean(get(CanonicalField::DefectFlag));
    record.defect_count = parse_number(get(CanonicalField::DefectCount));
    record.compliance_flag = parse_boolean(get(CanonicalField::ComplianceFlag));
    record.compliance_issue_type = coerce_text(get(CanonicalField::ComplianceIssueType));
    record.partial_order_flag = parse_boolean(get(CanonicalField::PartialOrderFlag));
    record.qty_ordered = parse_number(get(CanonicalField::QtyOrdered));
    record.qty_received = parse_number(get(CanonicalField::QtyReceived));
    record.unit_price = parse_number(get(CanonicalField::UnitPrice));
    record.total_cost = parse_number(get(CanonicalField::TotalCost));
    record.savings_amount = parse_number(get(CanonicalField::SavingsAmount));
    record.category = coerce_text(get(CanonicalField::Category));
    record.region = coerce_text(get(CanonicalField::Region));

    // Derived once here; later stages never recompute it.
    if record.total_cost.is_none() {
        if let (Some(qty), Some(price)) = (record.qty_ordered.or(record.qty_received), record.unit_price) {
            record.total_cost = Some(round_to(qty * price, 2));
            report.backfilled_costs += 1;
        }
    }

    if let Err(reason) = validate(&record) {
        // Keep the coerced values rather than dropping the row.
        report.validation_fallbacks += 1;
        tracing::debug!(po_id = %record.po_id, %reason, "canonical validation failed, keeping coerced values");
    }

    record.source_row = cleaned;
    record
}

/// Schema check over a freshly coerced record.
fn validate(record: &CanonicalRecord) -> std::result::Result<(), String> {
    if record.po_id.is_empty() {
        return Err("empty po_id".to_string());
    }
    if record.supplier.is_empty() {
        return Err("empty supplier".to_string());
    }
    let numbers = [
        ("defect_count", record.defect_count),
        ("qty_ordered", record.qty_ordered),
        ("qty_received", record.qty_received),
        ("unit_price", record.unit_price),
        ("total_cost", record.total_cost),
        ("savings_amount", record.savings_amount),
    ];
    for (name, value) in numbers {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(format!("{} is not finite", name));
        }
    }
    Ok(())
}

/// Canonicalize every row of a dataset.
pub fn map_rows(rows: &[RawRow], mapping: &ColumnMapping) -> Vec<CanonicalRecord> {
    map_rows_with_report(rows, mapping).0
}

pub fn map_rows_with_report(rows: &[RawRow], mapping: &ColumnMapping) -> (Vec<CanonicalRecord>, LoadReport) {
    let mut report = LoadReport {
        total_rows: rows.len(),
        ..LoadReport::default()
    };
    let records = rows
        .iter()
        .enumerate()
        .map(|(i, row)| to_canonical_with_report(row, mapping, i, &mut report))
        .collect();
    (records, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(cells: &[(&str, &str)]) -> RawRow {
        cells.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn mapping(pairs: &[(CanonicalField, &str)]) -> ColumnMapping {
        let mut m = ColumnMapping::default();
        for (f, h) in pairs {
            m.set(*f, Some(h.to_string()));
        }
        m
    }

    #[test]
    fn defaults_id_and_supplier() {
        let m = mapping(&[(CanonicalField::PoId, "PO"), (CanonicalField::Supplier, "Vendor")]);
        let r = to_canonical(&row(&[("PO", "  "), ("Vendor", "")]), &m, 4);
        assert_eq!(r.po_id, "row-5");
        assert_eq!(r.supplier, UNKNOWN_SUPPLIER);
    }

    #[test]
    fn unmapped_fields_stay_none() {
        let m = mapping(&[(CanonicalField::PoId, "PO")]);
        let r = to_canonical(&row(&[("PO", "A1"), ("Price", "10")]), &m, 0);
        assert_eq!(r.po_id, "A1");
        assert_eq!(r.unit_price, None);
        assert_eq!(r.total_cost, None);
    }

    #[test]
    fn parses_and_trims_cells() {
        let m = mapping(&[
            (CanonicalField::PoId, "PO"),
            (CanonicalField::Supplier, "Vendor"),
            (CanonicalField::PoDate, "Date"),
            (CanonicalField::DefectFlag, "Defect"),
            (CanonicalField::UnitPrice, "Price"),
        ]);
        let r = to_canonical(
            &row(&[("PO", " A1 "), ("Vendor", " Acme "), ("Date", "2024-01-15"), ("Defect", "yes"), ("Price", "$1,200")]),
            &m,
            0,
        );
        assert_eq!(r.supplier, "Acme");
        assert_eq!(r.po_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(r.defect_flag, Some(true));
        assert_eq!(r.unit_price, Some(1200.0));
        assert_eq!(r.source_row.get("PO").map(String::as_str), Some("A1"));
    }

    #[test]
    fn backfills_total_cost_preferring_ordered_quantity() {
        let m = mapping(&[
            (CanonicalField::QtyOrdered, "Ordered"),
            (CanonicalField::QtyReceived, "Received"),
            (CanonicalField::UnitPrice, "Price"),
        ]);
        let r = to_canonical(&row(&[("Ordered", "3"), ("Received", "2"), ("Price", "0.3333")]), &m, 0);
        assert_eq!(r.total_cost, Some(1.0));

        let r = to_canonical(&row(&[("Received", "2"), ("Price", "2.5")]), &m, 0);
        assert_eq!(r.total_cost, Some(5.0));
    }

    #[test]
    fn present_total_cost_is_never_recomputed() {
        let m = mapping(&[
            (CanonicalField::QtyOrdered, "Ordered"),
            (CanonicalField::UnitPrice, "Price"),
            (CanonicalField::TotalCost, "Total"),
        ]);
        let r = to_canonical(&row(&[("Ordered", "3"), ("Price", "10"), ("Total", "25")]), &m, 0);
        assert_eq!(r.total_cost, Some(25.0));
    }

    #[test]
    fn map_rows_reports_defaults() {
        let m = mapping(&[(CanonicalField::PoId, "PO"), (CanonicalField::Supplier, "Vendor")]);
        let rows = vec![row(&[("PO", ""), ("Vendor", "Acme")]), row(&[("PO", "B"), ("Vendor", "")])];
        let (records, report) = map_rows_with_report(&rows, &m);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].po_id, "row-1");
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.synthetic_ids, 1);
        assert_eq!(report.unknown_suppliers, 1);
        assert_eq!(report.validation_fallbacks, 0);
    }

    #[test]
    fn reads_csv_and_trims() {
        let data = " PO , Vendor \nA1, Acme \n\nA2,Beta\nA3\n";
        let table = read_csv_from(data.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["PO".to_string(), "Vendor".to_string()]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].get("Vendor").map(String::as_str), Some("Acme"));
        assert_eq!(table.rows[2].get("Vendor"), None);
    }
}
